use microseg_controller_core::Outcome;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    reconciles: Family<ReconcileLabels, Counter>,
    skipped: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReconcileLabels {
    kind: &'static str,
    outcome: &'static str,
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::default();
        reg.register(
            "reconciles",
            "Count of reconciliations by owner kind and outcome",
            reconciles.clone(),
        );

        let skipped = Counter::default();
        reg.register(
            "requests_skipped",
            "Count of requests skipped because this replica does not hold the write lease",
            skipped.clone(),
        );

        Self {
            reconciles,
            skipped,
        }
    }

    pub(crate) fn observe(&self, kind: &'static str, outcome: Outcome) {
        let outcome = match outcome {
            Outcome::Done => "done",
            Outcome::RequeueAfter(_) => "requeue",
            Outcome::Fatal => "fatal",
        };
        self.reconciles
            .get_or_create(&ReconcileLabels { kind, outcome })
            .inc();
    }

    pub(crate) fn skip(&self) {
        self.skipped.inc();
    }

    #[cfg(test)]
    pub(crate) fn reconciles(&self, kind: &'static str, outcome: &'static str) -> u64 {
        self.reconciles
            .get_or_create(&ReconcileLabels { kind, outcome })
            .get()
    }
}
