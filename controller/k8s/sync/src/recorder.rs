use async_trait::async_trait;
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder, Reporter};
use microseg_controller_core::{Event, EventRecorder};
use microseg_controller_k8s_api as k8s;

const ACTION: &str = "Reconcile";

/// Publishes reconciliation events against the owning object.
///
/// Publishing is best-effort: failures are logged and otherwise ignored.
#[derive(Clone)]
pub struct KubeRecorder {
    recorder: Recorder,
}

// === impl KubeRecorder ===

impl KubeRecorder {
    pub fn new(client: k8s::Client, controller: impl Into<String>) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl<O> EventRecorder<O> for KubeRecorder
where
    O: k8s::Resource<DynamicType = ()> + Send + Sync,
{
    async fn publish(&self, owner: &O, event: Event) {
        let reference = owner.object_ref(&());
        let event = KubeEvent {
            type_: EventType::Warning,
            reason: event.reason.to_string(),
            note: Some(event.note),
            action: ACTION.to_string(),
            secondary: None,
        };
        if let Err(error) = self.recorder.publish(&event, &reference).await {
            tracing::warn!(%error, reason = %event.reason, "Failed to publish event");
        }
    }
}
