use crate::{annotations::OwnerAnnotations, policy::Selector};
use microseg_controller_k8s_api::{self as k8s, ResourceExt};

/// Identifies an owner resource. Cluster-scoped owners have no namespace.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct OwnerId {
    pub namespace: Option<String>,
    pub name: String,
}

/// The capabilities the reconciler needs from a resource that owns policies.
///
/// Implemented once per primary kind so that a single reconcile loop serves namespaces and
/// services alike.
pub trait OwnerResource: Send + Sync {
    /// A short, human-readable kind name used in logs and metrics.
    const KIND: &'static str;

    fn owner_id(&self) -> OwnerId;

    /// The UID recorded in the controller reference of owned policies.
    fn uid(&self) -> Option<String>;

    fn owner_annotations(&self) -> OwnerAnnotations;

    fn is_being_deleted(&self) -> bool;

    /// The namespace in which this owner's policies live.
    fn policy_namespace(&self) -> String;

    /// The pods to which this owner's policies apply.
    fn pod_selector(&self) -> Selector {
        Selector::default()
    }

    /// Qualifies one of the fixed policy names for this owner.
    fn policy_name(&self, name: &str) -> String {
        name.to_string()
    }
}

// === impl OwnerId ===

impl OwnerId {
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => self.name.fmt(f),
        }
    }
}

// === impl k8s::Namespace ===

impl OwnerResource for k8s::Namespace {
    const KIND: &'static str = "namespace";

    fn owner_id(&self) -> OwnerId {
        OwnerId::cluster(self.name_any())
    }

    fn uid(&self) -> Option<String> {
        self.metadata.uid.clone()
    }

    fn owner_annotations(&self) -> OwnerAnnotations {
        OwnerAnnotations::from_map(self.annotations())
    }

    fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn policy_namespace(&self) -> String {
        self.name_any()
    }
}

// === impl k8s::Service ===

impl OwnerResource for k8s::Service {
    const KIND: &'static str = "service";

    fn owner_id(&self) -> OwnerId {
        OwnerId {
            namespace: self.namespace(),
            name: self.name_any(),
        }
    }

    fn uid(&self) -> Option<String> {
        self.metadata.uid.clone()
    }

    fn owner_annotations(&self) -> OwnerAnnotations {
        OwnerAnnotations::from_map(self.annotations())
    }

    fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn policy_namespace(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    /// A service's policies apply only to the pods it selects.
    fn pod_selector(&self) -> Selector {
        self.spec
            .as_ref()
            .and_then(|spec| spec.selector.clone())
            .unwrap_or_default()
    }

    /// Several services may share a namespace, so their policy names carry the service name.
    fn policy_name(&self, name: &str) -> String {
        format!("{}-{}", self.name_any(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s::{ObjectMeta, ServiceSpec};
    use maplit::btreemap;

    #[test]
    fn namespace_owns_policies_in_itself() {
        let ns = k8s::Namespace {
            metadata: ObjectMeta {
                name: Some("ns-a".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ns.owner_id(), OwnerId::cluster("ns-a"));
        assert_eq!(ns.policy_namespace(), "ns-a");
        assert_eq!(ns.policy_name("deny-by-default"), "deny-by-default");
        assert!(ns.pod_selector().is_empty());
        assert!(!ns.is_being_deleted());
    }

    #[test]
    fn service_scopes_policies_to_its_pods() {
        let svc = k8s::Service {
            metadata: ObjectMeta {
                namespace: Some("ns-a".to_string()),
                name: Some("web".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(btreemap! { "app".to_string() => "web".to_string() }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(svc.owner_id(), OwnerId::namespaced("ns-a", "web"));
        assert_eq!(svc.owner_id().to_string(), "ns-a/web");
        assert_eq!(svc.policy_namespace(), "ns-a");
        assert_eq!(svc.policy_name("deny-by-default"), "web-deny-by-default");
        assert_eq!(
            svc.pod_selector(),
            btreemap! { "app".to_string() => "web".to_string() }
        );
    }
}
