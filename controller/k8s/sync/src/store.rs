use crate::policy;
use anyhow::anyhow;
use async_trait::async_trait;
use microseg_controller_core::{
    ObservedPolicy, OwnerId, PolicySpec, PolicyStore, ResourceId, StoreError,
};
use microseg_controller_k8s_api::{self as k8s, ResourceExt};

/// The field manager used for server-side apply and the value of the
/// managed-by label on every policy the controller writes.
pub const FIELD_MANAGER: &str = "microsegmentation-controller";

/// A [`PolicyStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: k8s::Client,
}

// === impl KubeStore ===

impl KubeStore {
    pub fn new(client: k8s::Client) -> Self {
        Self { client }
    }

    fn policies(&self, namespace: &str) -> k8s::Api<k8s::NetworkPolicy> {
        k8s::Api::namespaced(self.client.clone(), namespace)
    }

    async fn get(&self, id: &ResourceId) -> Result<Option<ObservedPolicy>, StoreError> {
        let policy = self
            .policies(&id.namespace)
            .get_opt(&id.name)
            .await
            .map_err(api_error)?;
        Ok(policy
            .as_ref()
            .map(|policy| policy::observe(policy, FIELD_MANAGER)))
    }

    async fn apply<O>(&self, owner: &O, id: &ResourceId, spec: &PolicySpec) -> Result<(), StoreError>
    where
        O: k8s::Resource<DynamicType = ()>,
    {
        let oref = owner.controller_owner_ref(&()).ok_or_else(|| {
            StoreError::Api(anyhow!("{} {} has no UID", O::kind(&()), owner.name_any()))
        })?;
        let doc = policy::to_apply(id, spec, &oref, FIELD_MANAGER);
        let params = k8s::PatchParams::apply(FIELD_MANAGER).force();
        self.policies(&id.namespace)
            .patch(&id.name, &params, &k8s::Patch::Apply(doc))
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), StoreError> {
        match self
            .policies(&id.namespace)
            .delete(&id.name, &k8s::DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if k8s::is_not_found(&error) => Err(StoreError::NotFound),
            Err(error) => Err(api_error(error)),
        }
    }
}

#[async_trait]
impl PolicyStore<k8s::Namespace> for KubeStore {
    async fn get_owner(&self, id: &OwnerId) -> Result<Option<k8s::Namespace>, StoreError> {
        // Namespaces are cluster-scoped.
        k8s::Api::<k8s::Namespace>::all(self.client.clone())
            .get_opt(&id.name)
            .await
            .map_err(api_error)
    }

    async fn get_policy(&self, id: &ResourceId) -> Result<Option<ObservedPolicy>, StoreError> {
        self.get(id).await
    }

    async fn apply_policy(
        &self,
        owner: &k8s::Namespace,
        id: &ResourceId,
        spec: &PolicySpec,
    ) -> Result<(), StoreError> {
        self.apply(owner, id, spec).await
    }

    async fn delete_policy(&self, id: &ResourceId) -> Result<(), StoreError> {
        self.delete(id).await
    }
}

#[async_trait]
impl PolicyStore<k8s::Service> for KubeStore {
    async fn get_owner(&self, id: &OwnerId) -> Result<Option<k8s::Service>, StoreError> {
        let Some(namespace) = id.namespace.as_deref() else {
            return Ok(None);
        };
        k8s::Api::<k8s::Service>::namespaced(self.client.clone(), namespace)
            .get_opt(&id.name)
            .await
            .map_err(api_error)
    }

    async fn get_policy(&self, id: &ResourceId) -> Result<Option<ObservedPolicy>, StoreError> {
        self.get(id).await
    }

    async fn apply_policy(
        &self,
        owner: &k8s::Service,
        id: &ResourceId,
        spec: &PolicySpec,
    ) -> Result<(), StoreError> {
        self.apply(owner, id, spec).await
    }

    async fn delete_policy(&self, id: &ResourceId) -> Result<(), StoreError> {
        self.delete(id).await
    }
}

fn api_error(error: k8s::Error) -> StoreError {
    StoreError::Api(error.into())
}
