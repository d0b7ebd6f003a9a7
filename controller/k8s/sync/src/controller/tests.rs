use super::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use microseg_controller_core::{
    Event, ObservedPolicy, OwnerId, PolicySpec, ReconcileConfig, ResourceId, StoreError,
};
use prometheus_client::registry::Registry;

const RETRY: time::Duration = time::Duration::from_secs(120);

/// Owners named "broken" cannot be read; every other owner is missing.
#[derive(Clone, Default)]
struct Store;

#[derive(Clone, Default)]
struct Recorder;

#[async_trait]
impl<O: Send + Sync + 'static> PolicyStore<O> for Store {
    async fn get_owner(&self, id: &OwnerId) -> Result<Option<O>, StoreError> {
        if id.name == "broken" {
            return Err(StoreError::Api(anyhow::anyhow!("unavailable")));
        }
        Ok(None)
    }

    async fn get_policy(&self, _: &ResourceId) -> Result<Option<ObservedPolicy>, StoreError> {
        Ok(None)
    }

    async fn apply_policy(&self, _: &O, _: &ResourceId, _: &PolicySpec) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete_policy(&self, _: &ResourceId) -> Result<(), StoreError> {
        Err(StoreError::NotFound)
    }
}

#[async_trait]
impl<O: Send + Sync + 'static> EventRecorder<O> for Recorder {
    async fn publish(&self, _: &O, _: Event) {}
}

fn mk_controller() -> (
    mpsc::UnboundedSender<Request>,
    mpsc::UnboundedReceiver<Request>,
    ControllerMetrics,
    Controller<Store, Recorder>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (requeue_tx, requeue_rx) = mpsc::unbounded_channel();
    let metrics = ControllerMetrics::register(&mut Registry::default());
    let config = ReconcileConfig {
        retry_delay: RETRY,
        ..ReconcileConfig::default()
    };
    let reconciler = Reconciler::new(Store, Recorder, config);
    let controller = Controller::new(reconciler, rx, requeue_tx, metrics.clone());
    (tx, requeue_rx, metrics, controller)
}

#[tokio::test(start_paused = true)]
async fn failed_requests_are_requeued_after_the_retry_delay() {
    let (tx, mut requeues, metrics, controller) = mk_controller();
    tokio::spawn(controller.run());

    tx.send(Request::Namespace("broken".to_string())).unwrap();
    time::sleep(RETRY - time::Duration::from_secs(1)).await;
    assert!(requeues.try_recv().is_err(), "must not requeue early");

    time::sleep(time::Duration::from_secs(2)).await;
    assert_eq!(
        requeues.try_recv().ok(),
        Some(Request::Namespace("broken".to_string()))
    );
    assert_eq!(metrics.reconciles("namespace", "requeue"), 1);
}

#[tokio::test(start_paused = true)]
async fn completed_requests_are_not_requeued() {
    let (tx, mut requeues, metrics, controller) = mk_controller();
    tokio::spawn(controller.run());

    tx.send(Request::Service(ResourceId::new("ns-a", "web")))
        .unwrap();
    time::sleep(RETRY * 2).await;
    assert!(requeues.try_recv().is_err());
    assert_eq!(metrics.reconciles("service", "done"), 1);
}

#[tokio::test(start_paused = true)]
async fn requests_are_skipped_without_the_lease() {
    let (tx, mut requeues, metrics, controller) = mk_controller();
    let claim = Claim {
        holder: "other".to_string(),
        expiry: DateTime::<Utc>::MAX_UTC,
    };
    let (_claims_tx, claims_rx) = watch::channel(Arc::new(claim));
    tokio::spawn(controller.with_lease(claims_rx, "me".to_string()).run());

    tx.send(Request::Namespace("broken".to_string())).unwrap();
    time::sleep(RETRY * 2).await;
    assert!(requeues.try_recv().is_err());
    assert_eq!(metrics.reconciles("namespace", "requeue"), 0);
}
