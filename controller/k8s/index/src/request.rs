use microseg_controller_core::{OwnerId, OwnerResource, ResourceId};
use microseg_controller_k8s_api as k8s;

/// Names an owner that needs to be reconciled.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Request {
    Namespace(String),
    Service(ResourceId),
}

// === impl Request ===

impl Request {
    pub fn owner_id(&self) -> OwnerId {
        match self {
            Self::Namespace(name) => OwnerId::cluster(name),
            Self::Service(ResourceId { namespace, name }) => OwnerId::namespaced(namespace, name),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Namespace(_) => k8s::Namespace::KIND,
            Self::Service(_) => k8s::Service::KIND,
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.owner_id())
    }
}
