use crate::Request;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kubert::lease::Claim;
use microseg_controller_core::{EventFilter, OwnerAnnotations, ResourceId};
use microseg_controller_k8s_api::{self as k8s, OwnerReference, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc::UnboundedSender, watch};

pub type SharedIndex = Arc<RwLock<Index>>;

pub struct Index {
    filter: EventFilter,
    requests: UnboundedSender<Request>,

    /// The last observed annotations of each owner, used to evaluate updates.
    namespaces: HashMap<String, OwnerAnnotations>,
    services: HashMap<ResourceId, OwnerAnnotations>,

    /// The policies controlled by each owner.
    owned: HashMap<Request, HashSet<ResourceId>>,

    /// The controlling owner of each indexed policy.
    controllers: HashMap<ResourceId, Request>,
}

// === impl Index ===

impl Index {
    pub fn shared(filter: EventFilter, requests: UnboundedSender<Request>) -> SharedIndex {
        Arc::new(RwLock::new(Self::new(filter, requests)))
    }

    pub fn new(filter: EventFilter, requests: UnboundedSender<Request>) -> Self {
        Self {
            filter,
            requests,
            namespaces: HashMap::new(),
            services: HashMap::new(),
            owned: HashMap::new(),
            controllers: HashMap::new(),
        }
    }

    /// Returns the policies controlled by `owner`.
    pub fn owned_policies(&self, owner: &Request) -> impl Iterator<Item = &ResourceId> + '_ {
        self.owned.get(owner).into_iter().flatten()
    }

    /// Requests a reconciliation of every owner that enables microsegmentation or still controls
    /// policies.
    pub fn resync(&self) {
        let enabled_namespaces = self
            .namespaces
            .iter()
            .filter(|(_, anns)| anns.microsegmentation())
            .map(|(name, _)| Request::Namespace(name.clone()));
        let enabled_services = self
            .services
            .iter()
            .filter(|(_, anns)| anns.microsegmentation())
            .map(|(id, _)| Request::Service(id.clone()));
        let owners = self.owned.keys().cloned();

        let requests = enabled_namespaces
            .chain(enabled_services)
            .chain(owners)
            .collect::<HashSet<_>>();
        tracing::debug!(owners = requests.len(), "Resynchronizing");
        for request in requests {
            self.send(request);
        }
    }

    fn send(&self, request: Request) {
        tracing::trace!(%request, "Enqueueing");
        if let Err(error) = self.requests.send(request) {
            tracing::error!(%error, "Failed to enqueue reconcile request");
        }
    }

    /// Records an owner's annotations, returning true if the change is admitted.
    fn admit<K>(
        filter: EventFilter,
        owners: &mut HashMap<K, OwnerAnnotations>,
        key: K,
        anns: OwnerAnnotations,
    ) -> bool
    where
        K: Eq + std::hash::Hash,
    {
        match owners.insert(key, anns.clone()) {
            None => filter.admit_create(&anns),
            Some(old) => filter.admit_update(&old, &anns),
        }
    }

    fn index_policy(&mut self, id: ResourceId, owner: Option<Request>) {
        let previous = match owner {
            Some(owner) => {
                self.owned
                    .entry(owner.clone())
                    .or_default()
                    .insert(id.clone());
                self.controllers.insert(id.clone(), owner)
            }
            None => self.controllers.remove(&id),
        };

        // The policy may have been handed to another owner (or released) since it was last seen.
        if let Some(previous) = previous {
            if self.controllers.get(&id) != Some(&previous) {
                self.release(&previous, &id);
            }
        }
    }

    fn release(&mut self, owner: &Request, id: &ResourceId) {
        if let Some(policies) = self.owned.get_mut(owner) {
            policies.remove(id);
            if policies.is_empty() {
                self.owned.remove(owner);
            }
        }
    }
}

/// Returns the owner that controls a policy in `namespace`, if it is one of the owner kinds.
fn controlling_owner(namespace: &str, oref: &OwnerReference) -> Option<Request> {
    if oref.api_version != "v1" {
        return None;
    }
    match oref.kind.as_str() {
        "Namespace" => Some(Request::Namespace(oref.name.clone())),
        "Service" => Some(Request::Service(ResourceId::new(namespace, &oref.name))),
        _ => None,
    }
}

impl kubert::index::IndexClusterResource<k8s::Namespace> for Index {
    fn apply(&mut self, ns: k8s::Namespace) {
        let name = ns.name_unchecked();
        let anns = OwnerAnnotations::from_map(ns.annotations());
        if Self::admit(self.filter, &mut self.namespaces, name.clone(), anns) {
            self.send(Request::Namespace(name));
        }
    }

    fn delete(&mut self, name: String) {
        self.namespaces.remove(&name);
        self.send(Request::Namespace(name));
    }

    // Since apply only reindexes a single Namespace at a time, there's no need
    // to handle resets specially.
}

impl kubert::index::IndexNamespacedResource<k8s::Service> for Index {
    fn apply(&mut self, svc: k8s::Service) {
        let Some(namespace) = svc.namespace() else {
            tracing::warn!(name = %svc.name_any(), "Ignoring Service without a namespace");
            return;
        };
        let id = ResourceId::new(namespace, svc.name_unchecked());
        let anns = OwnerAnnotations::from_map(svc.annotations());
        if Self::admit(self.filter, &mut self.services, id.clone(), anns) {
            self.send(Request::Service(id));
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.services.remove(&id);
        self.send(Request::Service(id));
    }
}

impl kubert::index::IndexNamespacedResource<k8s::NetworkPolicy> for Index {
    fn apply(&mut self, policy: k8s::NetworkPolicy) {
        let Some(namespace) = policy.namespace() else {
            tracing::warn!(name = %policy.name_any(), "Ignoring NetworkPolicy without a namespace");
            return;
        };
        let owner = k8s::controller_owner(&policy.metadata)
            .and_then(|oref| controlling_owner(&namespace, oref));
        let id = ResourceId::new(namespace, policy.name_unchecked());

        self.index_policy(id, owner.clone());
        if let Some(owner) = owner {
            self.send(owner);
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        if let Some(owner) = self.controllers.remove(&id) {
            self.release(&owner, &id);
            self.send(owner);
        }
    }
}

/// Resynchronizes all owners each time `claimant` acquires the lease, so that nothing
/// changed while another replica held it is missed.
pub async fn resync_on_claim(
    index: SharedIndex,
    mut claims: watch::Receiver<Arc<Claim>>,
    claimant: String,
) {
    let mut leading = false;
    loop {
        let current = claims.borrow_and_update().is_current_for(&claimant);
        if current && !leading {
            tracing::info!(%claimant, "Acquired lease");
            index.read().resync();
        }
        leading = current;

        if claims.changed().await.is_err() {
            return;
        }
    }
}
