use crate::{
    core::{EventFilter, ReconcileConfig, Reconciler},
    index::{self, Index},
    k8s, lease,
    sync::{Controller, ControllerMetrics, KubeRecorder, KubeStore, FIELD_MANAGER},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "microseg",
    about = "Maintains NetworkPolicies for annotated namespaces and services"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "microseg=info,warn",
        env = "MICROSEG_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Seconds to wait before retrying an owner whose reconciliation failed.
    #[clap(long, default_value = "120")]
    retry_delay_secs: u64,

    /// Bound on each individual API call made while reconciling.
    #[clap(long, default_value = "5000")]
    store_timeout_ms: u64,

    /// Also reconcile when an owner's namespace label annotations change.
    #[clap(long)]
    reconcile_on_label_changes: bool,

    #[clap(long, default_value = "microseg-controller")]
    controller_deployment_name: String,

    #[clap(long, default_value = "microseg", env = "MICROSEG_CONTROLLER_NAMESPACE")]
    controller_namespace: String,

    /// Reconciles without holding the write lease. Only one replica may run
    /// with this set.
    #[clap(long)]
    leader_election_disabled: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            retry_delay_secs,
            store_timeout_ms,
            reconcile_on_label_changes,
            controller_deployment_name,
            controller_namespace,
            leader_election_disabled,
        } = self;

        let mut prom = <Registry>::default();
        let metrics =
            ControllerMetrics::register(prom.sub_registry_with_prefix("microseg_controller"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let claims = if leader_election_disabled {
            tracing::warn!("Leader election is disabled");
            None
        } else {
            let hostname = std::env::var("HOSTNAME")
                .context("Failed to fetch `HOSTNAME` environment variable")?;
            let claims = lease::init(
                &runtime,
                &controller_namespace,
                &controller_deployment_name,
                &hostname,
            )
            .await?;
            Some((claims, hostname))
        };

        // Watch events and requeues feed the same request queue.
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let index = Index::shared(
            EventFilter::new(reconcile_on_label_changes),
            requests_tx.clone(),
        );

        // Spawn resource watches.

        let namespaces = runtime.watch_all::<k8s::Namespace>(watcher::Config::default());
        tokio::spawn(
            kubert::index::cluster(index.clone(), namespaces).instrument(info_span!("namespaces")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
        );

        // Only policies written by this controller are indexed.
        let managed = format!("{}={FIELD_MANAGER}", k8s::labels::MANAGED_BY);
        let policies =
            runtime.watch_all::<k8s::NetworkPolicy>(watcher::Config::default().labels(&managed));
        tokio::spawn(
            kubert::index::namespaced(index.clone(), policies)
                .instrument(info_span!("networkpolicies")),
        );

        let client = runtime.client();
        let reconciler = Reconciler::new(
            KubeStore::new(client.clone()),
            KubeRecorder::new(client, FIELD_MANAGER),
            ReconcileConfig {
                retry_delay: Duration::from_secs(retry_delay_secs),
                store_timeout: Duration::from_millis(store_timeout_ms),
            },
        );
        let mut controller = Controller::new(reconciler, requests_rx, requests_tx, metrics);
        if let Some((claims, hostname)) = claims {
            tokio::spawn(
                index::resync_on_claim(index.clone(), claims.clone(), hostname.clone())
                    .instrument(info_span!("lease")),
            );
            controller = controller.with_lease(claims, hostname);
        }
        tokio::spawn(controller.run().instrument(info_span!("controller")));

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
