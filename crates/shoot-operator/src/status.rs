//! Projection of the observed Shoot state onto ShootCluster status
//!
//! States only move forward: `"" -> Creating -> Ready`, or from a non-terminal
//! state into `Error`. `Ready` and `Error` are left as they are here; only the
//! sync flow itself forces `Error` on a Ready resource.

use tracing::{debug, info, instrument, warn};

use crate::client::{ApiError, ShootService};
use crate::shoot::Shoot;
use crate::shootcluster::{ShootCluster, ShootClusterState};

/// What the backend reports about a Shoot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Ready,
    Progressing(String),
    Failed(String),
}

/// Classify a Shoot by its last operation
pub fn observe(shoot: &Shoot) -> Observed {
    let Some(op) = shoot
        .status
        .as_ref()
        .and_then(|s| s.last_operation.as_ref())
    else {
        return Observed::Progressing("waiting for the shoot to be processed".to_string());
    };

    match op.state.as_str() {
        "Succeeded" if op.type_ != "Delete" => Observed::Ready,
        "Failed" | "Aborted" => Observed::Failed(format!(
            "{} {}: {}",
            op.type_, op.state, op.description
        )),
        _ => Observed::Progressing(format!(
            "{} {} ({}%): {}",
            op.type_, op.state, op.progress, op.description
        )),
    }
}

/// Set state to Creating with an empty message when no state was ever written
pub fn initialize(shoot_cluster: &mut ShootCluster) {
    if shoot_cluster.state() == ShootClusterState::Unset {
        let status = shoot_cluster.status_mut();
        status.state = ShootClusterState::Creating;
        status.message = String::new();
    }
}

/// Apply an observation to the ShootCluster status
pub fn project(shoot_cluster: &mut ShootCluster, observed: Observed) {
    initialize(shoot_cluster);
    let status = shoot_cluster.status_mut();

    match (status.state, observed) {
        (ShootClusterState::Creating, Observed::Ready) => {
            info!("Shoot is ready");
            status.state = ShootClusterState::Ready;
            status.message = String::new();
        }
        (ShootClusterState::Creating, Observed::Progressing(message)) => {
            status.message = message;
        }
        (ShootClusterState::Creating, Observed::Failed(message)) => {
            warn!(message = %message, "Shoot provisioning failed");
            status.state = ShootClusterState::Error;
            status.message = message;
        }
        (state, observed) => {
            debug!(state = %state, observed = ?observed, "State is settled, leaving it as is");
        }
    }
}

/// Fetch the live Shoot and project its state onto the ShootCluster
#[instrument(skip_all, fields(shoot = %shoot_cluster.spec.shoot_name))]
pub async fn check_readiness_and_update(
    shoots: &dyn ShootService,
    shoot_cluster: &mut ShootCluster,
) -> Result<(), ApiError> {
    initialize(shoot_cluster);

    let shoot = shoots
        .get_shoot(
            &shoot_cluster.spec.gardener_namespace,
            &shoot_cluster.spec.shoot_name,
        )
        .await?;

    project(shoot_cluster, observe(&shoot));
    Ok(())
}
