use crate::metrics::ControllerMetrics;
use kubert::lease::Claim;
use microseg_controller_core::{EventRecorder, Outcome, PolicyStore, Reconciler};
use microseg_controller_k8s_api as k8s;
use microseg_controller_k8s_index::Request;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::Instrument;

/// Processes reconcile requests one at a time.
///
/// Requests are only processed while this replica holds the write lease.
/// Requests that fail are re-sent on the requeue channel after the
/// reconciler's retry delay.
pub struct Controller<S, R> {
    reconciler: Reconciler<S, R>,
    requests: mpsc::UnboundedReceiver<Request>,
    requeues: mpsc::UnboundedSender<Request>,
    lease: Option<(watch::Receiver<Arc<Claim>>, String)>,
    metrics: ControllerMetrics,
}

// === impl Controller ===

impl<S, R> Controller<S, R>
where
    S: PolicyStore<k8s::Namespace> + PolicyStore<k8s::Service>,
    R: EventRecorder<k8s::Namespace> + EventRecorder<k8s::Service>,
{
    pub fn new(
        reconciler: Reconciler<S, R>,
        requests: mpsc::UnboundedReceiver<Request>,
        requeues: mpsc::UnboundedSender<Request>,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            reconciler,
            requests,
            requeues,
            lease: None,
            metrics,
        }
    }

    /// Restricts processing to the holder of the write lease.
    pub fn with_lease(mut self, claims: watch::Receiver<Arc<Claim>>, claimant: String) -> Self {
        self.lease = Some((claims, claimant));
        self
    }

    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            if !self.is_leader() {
                tracing::debug!(%request, "Not the lease holder; skipping");
                self.metrics.skip();
                continue;
            }

            let outcome = self
                .process(&request)
                .instrument(tracing::info_span!("reconcile", %request))
                .await;
            self.metrics.observe(request.kind(), outcome);
            match outcome {
                Outcome::Done => {}
                Outcome::RequeueAfter(delay) => self.requeue(request, delay),
                Outcome::Fatal => tracing::warn!(%request, "Dropping request"),
            }
        }
        tracing::debug!("Request channel closed");
    }

    fn is_leader(&self) -> bool {
        match &self.lease {
            Some((claims, claimant)) => claims.borrow().is_current_for(claimant),
            None => true,
        }
    }

    async fn process(&self, request: &Request) -> Outcome {
        let id = request.owner_id();
        match request {
            Request::Namespace(_) => self.reconciler.reconcile::<k8s::Namespace>(&id).await,
            Request::Service(_) => self.reconciler.reconcile::<k8s::Service>(&id).await,
        }
    }

    fn requeue(&self, request: Request, delay: time::Duration) {
        tracing::debug!(%request, ?delay, "Requeueing");
        let tx = self.requeues.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            if tx.send(request).is_err() {
                tracing::debug!("Requeue channel closed");
            }
        });
    }
}

#[cfg(test)]
mod tests;
