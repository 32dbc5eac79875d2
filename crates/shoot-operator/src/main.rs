use std::sync::Arc;

use anyhow::{bail, Context, Result};
use kube::api::ListParams;
use kube::{Api, Client};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use shoot_operator::cache::ClientCache;
use shoot_operator::client::ClientAccessor;
use shoot_operator::config::{ShootOperatorConfig, ShootOperatorConfigSpec};
use shoot_operator::controllers::retry::RetryTracker;
use shoot_operator::controllers::{self, ControllerContext};
use shoot_operator::health::{self, HealthState};
use shoot_operator::leader::{LeaderElection, LeaseSettings};
use shoot_operator::operator::ShootOperator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                .with_current_span(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("shoot-operator starting");

    let kube_client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let config = load_config(&kube_client)
        .await
        .context("Failed to load ShootOperatorConfig")?;

    info!(
        finalizer = %config.finalizer,
        cloud_profile = %config.provisioning.cloud_profile,
        region = %config.provisioning.region,
        garden_secret = %config.garden_kubeconfig_secret_ref.name,
        "Loaded configuration"
    );

    let accessor: Arc<dyn ClientAccessor> = Arc::new(ClientCache::new(
        kube_client.clone(),
        config.garden_kubeconfig_secret_ref.clone(),
    ));

    let health_state = Arc::new(HealthState::new(accessor.clone()));
    let health_port = health::port_from_env();
    let health_server = tokio::spawn(health::run_health_server(health_state, health_port));

    if let Some(lease) = LeaseSettings::from_env().context("Invalid leader election config")? {
        info!(
            lease = %lease.lease_name,
            namespace = %lease.namespace,
            holder = %lease.holder_id,
            "Leader election enabled"
        );
        let leader = LeaderElection::new(kube_client.clone(), &lease);
        leader.acquire().await;
        let _renewal = leader.spawn_renewal_task();
    }

    let config = Arc::new(config);
    let ctx = Arc::new(ControllerContext {
        operator: Arc::new(ShootOperator::new(accessor, config.clone())),
        config,
        retry_tracker: Arc::new(RetryTracker::new()),
    });

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    let controller = tokio::spawn(controllers::shootcluster::run(kube_client, ctx));

    select! {
        result = controller => {
            return handle_controller_exit(result);
        }
        result = health_server => {
            error!("Health server exited");
            match result {
                Ok(Ok(())) => bail!("Health server exited unexpectedly"),
                Ok(Err(e)) => return Err(e).context("Health server failed"),
                Err(e) => bail!("Health server task failed: {}", e),
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load the singleton ShootOperatorConfig
async fn load_config(client: &Client) -> Result<ShootOperatorConfigSpec> {
    let api: Api<ShootOperatorConfig> = Api::all(client.clone());
    let configs = api.list(&ListParams::default()).await?;

    let Some(first) = configs.items.first() else {
        bail!("No ShootOperatorConfig found in cluster - please create one");
    };

    if configs.items.len() > 1 {
        warn!(
            count = configs.items.len(),
            "Multiple ShootOperatorConfig resources found, using first one"
        );
    }

    Ok(first.spec.clone())
}

/// The controller only returns on shutdown or failure; either way the pod restarts
fn handle_controller_exit(result: std::result::Result<(), tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(()) => {
            info!("ShootCluster controller stopped");
            Ok(())
        }
        Err(e) if e.is_panic() => {
            error!("ShootCluster controller panicked");
            bail!("ShootCluster controller panicked: {:?}", e.into_panic())
        }
        Err(e) => {
            error!(error = ?e, "ShootCluster controller task failed");
            bail!("ShootCluster controller task failed: {}", e)
        }
    }
}
