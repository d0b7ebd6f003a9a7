//! The annotation contract read from owner resources.

use std::collections::BTreeMap;

pub const PREFIX: &str = "microsegmentation-operator.redhat-cop.io";

/// Enables management of an owner's policies when set to `"true"`.
pub const MICROSEGMENTATION: &str = "microsegmentation-operator.redhat-cop.io/microsegmentation";

/// Adds a policy admitting traffic from the owner's own namespace when set to `"true"`.
pub const ALLOW_FROM_SELF: &str = "microsegmentation-operator.redhat-cop.io/allow-from-self";

/// Comma-separated `key=value` namespace labels that may send traffic to the owner.
pub const INBOUND_NAMESPACE_LABELS: &str =
    "microsegmentation-operator.redhat-cop.io/inbound-namespace-labels";

/// Comma-separated `key=value` namespace labels that the owner may send traffic to.
pub const OUTBOUND_NAMESPACE_LABELS: &str =
    "microsegmentation-operator.redhat-cop.io/outbound-namespace-labels";

/// The subset of an owner's annotations that drives reconciliation.
///
/// Values are kept as the raw strings found on the object; boolean flags are only true when
/// spelled exactly `"true"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OwnerAnnotations {
    pub microsegmentation: Option<String>,
    pub allow_from_self: Option<String>,
    pub inbound_namespace_labels: Option<String>,
    pub outbound_namespace_labels: Option<String>,
}

// === impl OwnerAnnotations ===

impl OwnerAnnotations {
    pub fn from_map(annotations: &BTreeMap<String, String>) -> Self {
        Self {
            microsegmentation: annotations.get(MICROSEGMENTATION).cloned(),
            allow_from_self: annotations.get(ALLOW_FROM_SELF).cloned(),
            inbound_namespace_labels: annotations.get(INBOUND_NAMESPACE_LABELS).cloned(),
            outbound_namespace_labels: annotations.get(OUTBOUND_NAMESPACE_LABELS).cloned(),
        }
    }

    pub fn microsegmentation(&self) -> bool {
        is_true(&self.microsegmentation)
    }

    pub fn allow_from_self(&self) -> bool {
        is_true(&self.allow_from_self)
    }
}

impl From<&BTreeMap<String, String>> for OwnerAnnotations {
    fn from(annotations: &BTreeMap<String, String>) -> Self {
        Self::from_map(annotations)
    }
}

fn is_true(value: &Option<String>) -> bool {
    value.as_deref() == Some("true")
}
