use crate::{
    annotations::{INBOUND_NAMESPACE_LABELS, OUTBOUND_NAMESPACE_LABELS},
    labels::labels_annotation,
    owner::OwnerResource,
    ResourceId,
};
use std::collections::BTreeMap;

pub const DENY_BY_DEFAULT: &str = "deny-by-default";
pub const ALLOW_FROM_SELF: &str = "allow-from-self";
pub const INGRESS_FROM_NAMESPACES: &str = "ingress-from-namespaces";
pub const EGRESS_TO_NAMESPACES: &str = "egress-to-namespaces";

/// The label carrying a namespace's own name, used to select the owner's namespace.
pub const NAMESPACE_NAME_LABEL: &str = "name";

/// Exact-match labels.
pub type Selector = BTreeMap<String, String>;

/// The intended contents of a policy.
///
/// Rules keep the order in which their labels appear in the owner's annotations, so that
/// comparing a derived spec against an observed one is stable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicySpec {
    pub pod_selector: Selector,
    pub ingress: Vec<Rule>,
    pub egress: Vec<Rule>,
}

/// A single ingress or egress rule whose only peer is the set of namespaces matching a selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub namespaces: Selector,
}

/// A policy that may or may not be desired for an owner.
///
/// The identity is known even when the policy is not desired so that it can be removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub id: ResourceId,
    pub desired: Option<PolicySpec>,
}

/// The policies that should exist for an owner, given its current annotations.
///
/// `stale` holds the names the scoped policy takes under other annotations. None of them is
/// desired, so a scoped policy left behind by an earlier annotation is removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredPolicies {
    pub deny_by_default: Candidate,
    pub allow_from_self: Candidate,
    pub scoped: Candidate,
    pub stale: Vec<Candidate>,
}

// === impl DesiredPolicies ===

impl DesiredPolicies {
    pub fn derive<O: OwnerResource>(owner: &O) -> Self {
        let anns = owner.owner_annotations();
        let enabled = anns.microsegmentation();
        let namespace = owner.policy_namespace();
        let pod_selector = owner.pod_selector();

        let deny_by_default = Candidate {
            id: ResourceId::new(&namespace, owner.policy_name(DENY_BY_DEFAULT)),
            desired: enabled.then(|| PolicySpec {
                pod_selector: pod_selector.clone(),
                ingress: vec![],
                egress: vec![],
            }),
        };

        let allow_from_self = Candidate {
            id: ResourceId::new(&namespace, owner.policy_name(ALLOW_FROM_SELF)),
            desired: (enabled && anns.allow_from_self()).then(|| PolicySpec {
                pod_selector: pod_selector.clone(),
                ingress: vec![Rule::from_namespace_labels(Some((
                    NAMESPACE_NAME_LABEL.to_string(),
                    namespace.clone(),
                )))],
                egress: vec![],
            }),
        };

        // The outbound annotation is checked last, so it names the policy when both are set.
        let fallback = owner.owner_id().name;
        let mut name = fallback.clone();
        let mut ingress = Vec::new();
        if let Some(labels) = anns.inbound_namespace_labels.as_deref() {
            name = owner.policy_name(INGRESS_FROM_NAMESPACES);
            ingress = Rule::per_label(labels_annotation(INBOUND_NAMESPACE_LABELS, labels));
        }
        let mut egress = Vec::new();
        if let Some(labels) = anns.outbound_namespace_labels.as_deref() {
            name = owner.policy_name(EGRESS_TO_NAMESPACES);
            egress = Rule::per_label(labels_annotation(OUTBOUND_NAMESPACE_LABELS, labels));
        }
        let mut stale = Vec::new();
        for alt in [
            owner.policy_name(INGRESS_FROM_NAMESPACES),
            owner.policy_name(EGRESS_TO_NAMESPACES),
            fallback,
        ] {
            let taken = [&deny_by_default, &allow_from_self]
                .iter()
                .any(|c| c.id.name == alt);
            if alt != name && !taken && !stale.iter().any(|c: &Candidate| c.id.name == alt) {
                stale.push(Candidate {
                    id: ResourceId::new(&namespace, alt),
                    desired: None,
                });
            }
        }

        let scoped = Candidate {
            id: ResourceId::new(namespace, name),
            desired: enabled.then_some(PolicySpec {
                pod_selector,
                ingress,
                egress,
            }),
        };

        Self {
            deny_by_default,
            allow_from_self,
            scoped,
            stale,
        }
    }

    /// Returns the candidates in the order they must be applied, so that a default-deny policy is
    /// in place before any allow policy. Stale names come last.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> + '_ {
        [&self.deny_by_default, &self.allow_from_self, &self.scoped]
            .into_iter()
            .chain(&self.stale)
    }

    /// Returns true if no policy is desired.
    pub fn is_empty(&self) -> bool {
        self.candidates().all(|c| c.desired.is_none())
    }
}

// === impl Rule ===

impl Rule {
    pub fn from_namespace_labels(labels: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            namespaces: labels.into_iter().collect(),
        }
    }

    /// Builds one rule per label so that each label admits a distinct set of namespaces.
    fn per_label(labels: Vec<(String, String)>) -> Vec<Self> {
        labels
            .into_iter()
            .map(|label| Self::from_namespace_labels(Some(label)))
            .collect()
    }
}
