use crate::{
    owner::{OwnerId, OwnerResource},
    policy::{Candidate, DesiredPolicies, PolicySpec},
    ResourceId,
};
use std::future::Future;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

/// The event reason recorded on an owner when its policies could not be synchronized.
pub const PROCESSING_ERROR: &str = "ProcessingError";

/// Reads and writes owners and their policies.
///
/// Implementations must report a missing object on delete as [`StoreError::NotFound`] so that
/// the reconciler can tell it apart from a real failure.
#[async_trait::async_trait]
pub trait PolicyStore<O>: Send + Sync {
    async fn get_owner(&self, id: &OwnerId) -> Result<Option<O>, StoreError>;

    async fn get_policy(&self, id: &ResourceId) -> Result<Option<ObservedPolicy>, StoreError>;

    /// Creates or replaces the policy, recording `owner` as its controller.
    async fn apply_policy(
        &self,
        owner: &O,
        id: &ResourceId,
        spec: &PolicySpec,
    ) -> Result<(), StoreError>;

    async fn delete_policy(&self, id: &ResourceId) -> Result<(), StoreError>;
}

/// Records events about owners. Publishing never fails the caller.
#[async_trait::async_trait]
pub trait EventRecorder<O>: Send + Sync {
    async fn publish(&self, owner: &O, event: Event);
}

/// A warning about an owner whose policies could not be synchronized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub reason: &'static str,
    pub note: String,
}

/// A policy as it currently exists in the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedPolicy {
    /// The policy's contents, or `None` if they cannot be expressed as a [`PolicySpec`].
    pub spec: Option<PolicySpec>,

    /// The UID of the policy's controller, if it has one.
    pub controller_uid: Option<String>,

    /// Whether the policy carries the managed-by label that the controller watches.
    pub managed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("request timed out after {0:?}")]
    TimedOut(time::Duration),

    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

/// How a single candidate policy was synchronized.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Unchanged,
    Deleted,
    /// The policy is not desired and either did not exist or is controlled by someone else.
    Absent,
}

/// What the dispatcher should do with a request once it has been reconciled.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    RequeueAfter(time::Duration),
    /// The owner can never converge as it stands; retrying would not help.
    Fatal,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// The fixed delay before a failed reconciliation is retried.
    pub retry_delay: time::Duration,

    /// Bounds each individual store call.
    pub store_timeout: time::Duration,
}

/// Drives an owner's policies toward the state described by its annotations.
///
/// The reconciler holds no state between invocations: every call re-reads the owner and its
/// policies before writing, so it may be invoked repeatedly (or concurrently, for distinct owners)
/// without coordination.
#[derive(Clone, Debug)]
pub struct Reconciler<S, R> {
    store: S,
    recorder: R,
    config: ReconcileConfig,
}

// === impl ReconcileConfig ===

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retry_delay: time::Duration::from_secs(120),
            store_timeout: time::Duration::from_secs(5),
        }
    }
}

// === impl Reconciler ===

impl<S, R> Reconciler<S, R> {
    pub fn new(store: S, recorder: R, config: ReconcileConfig) -> Self {
        Self {
            store,
            recorder,
            config,
        }
    }

    #[instrument(skip(self, id), fields(kind = O::KIND, owner = %id))]
    pub async fn reconcile<O>(&self, id: &OwnerId) -> Outcome
    where
        O: OwnerResource,
        S: PolicyStore<O>,
        R: EventRecorder<O>,
    {
        let owner = match self.call(self.store.get_owner(id)).await {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                debug!("Owner not found");
                return Outcome::Done;
            }
            Err(error) => {
                warn!(%error, "Failed to fetch owner");
                return Outcome::RequeueAfter(self.config.retry_delay);
            }
        };

        if owner.is_being_deleted() {
            debug!("Owner is being deleted");
            return Outcome::Done;
        }

        let desired = DesiredPolicies::derive(&owner);
        if owner.uid().is_none() && !desired.is_empty() {
            error!("Owner has no UID; policies cannot reference it");
            return Outcome::Fatal;
        }

        for candidate in desired.candidates() {
            match self.sync(&owner, candidate).await {
                Ok(Change::Unchanged | Change::Absent) => {}
                Ok(change) => info!(policy = %candidate.id, ?change, "Synchronized policy"),
                Err(error) => {
                    warn!(policy = %candidate.id, %error, "Failed to synchronize policy");
                    let event = Event {
                        reason: PROCESSING_ERROR,
                        note: format!("policy {}: {}", candidate.id, error),
                    };
                    self.recorder.publish(&owner, event).await;
                    return Outcome::RequeueAfter(self.config.retry_delay);
                }
            }
        }

        Outcome::Done
    }

    /// Brings a single candidate policy in line with its desired state.
    ///
    /// A desired policy is written only when it is missing, differs from the desired spec, is
    /// controlled by something other than `owner`, or has lost its managed-by label. An undesired
    /// policy is deleted only if `owner` controls it; finding it already gone is not an error.
    pub async fn sync<O>(&self, owner: &O, candidate: &Candidate) -> Result<Change, StoreError>
    where
        O: OwnerResource,
        S: PolicyStore<O>,
    {
        let Candidate { id, desired } = candidate;
        let Some(spec) = desired else {
            match self.call(self.store.get_policy(id)).await? {
                Some(observed) if is_controlled_by(&observed, owner) => {}
                Some(_) => {
                    debug!(policy = %id, "Policy is not controlled by this owner");
                    return Ok(Change::Absent);
                }
                None => return Ok(Change::Absent),
            }
            return match self.call(self.store.delete_policy(id)).await {
                Ok(()) => Ok(Change::Deleted),
                Err(StoreError::NotFound) => Ok(Change::Absent),
                Err(error) => Err(error),
            };
        };

        let change = match self.call(self.store.get_policy(id)).await? {
            None => Change::Created,
            Some(observed) if is_current(&observed, owner, spec) => return Ok(Change::Unchanged),
            Some(_) => Change::Updated,
        };
        self.call(self.store.apply_policy(owner, id, spec)).await?;
        Ok(change)
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let timeout = self.config.store_timeout;
        time::timeout(timeout, request)
            .await
            .map_err(|_| StoreError::TimedOut(timeout))?
    }
}

fn is_controlled_by<O: OwnerResource>(observed: &ObservedPolicy, owner: &O) -> bool {
    match (&observed.controller_uid, owner.uid()) {
        (Some(observed), Some(uid)) => *observed == uid,
        _ => false,
    }
}

fn is_current<O: OwnerResource>(observed: &ObservedPolicy, owner: &O, spec: &PolicySpec) -> bool {
    observed.managed && is_controlled_by(observed, owner) && observed.spec.as_ref() == Some(spec)
}
