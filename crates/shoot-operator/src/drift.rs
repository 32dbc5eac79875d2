//! Spec drift correction for the managed worker pool
//!
//! Only the first worker pool is compared. Autoscaler bounds and volume size
//! are pushed back to the Shoot in a single update when any of them drifted.

use kube::ResourceExt;
use tracing::{debug, info, instrument};

use crate::client::{ApiError, ShootService};
use crate::provision::volume_size;
use crate::shoot::Shoot;
use crate::shootcluster::ShootClusterSpec;

/// Write the desired worker settings into `shoot`, returning whether anything changed
pub fn apply_desired(shoot: &mut Shoot, spec: &ShootClusterSpec) -> bool {
    let Some(worker) = shoot.first_worker_mut() else {
        return false;
    };

    let desired_volume = volume_size(spec.disk_size);
    let mut changed = false;

    if worker.auto_scaler_min != spec.min_nodes {
        worker.auto_scaler_min = spec.min_nodes;
        changed = true;
    }
    if worker.auto_scaler_max != spec.max_nodes {
        worker.auto_scaler_max = spec.max_nodes;
        changed = true;
    }
    if worker.volume_size != desired_volume {
        worker.volume_size = desired_volume;
        changed = true;
    }

    changed
}

/// Bring the live Shoot's worker pool back in line with the ShootCluster
///
/// Returns whether an update was issued.
#[instrument(skip_all, fields(shoot = %spec.shoot_name, namespace = %spec.gardener_namespace))]
pub async fn reconcile_spec(
    shoots: &dyn ShootService,
    spec: &ShootClusterSpec,
) -> Result<bool, ApiError> {
    let mut shoot = shoots
        .get_shoot(&spec.gardener_namespace, &spec.shoot_name)
        .await?;

    if !apply_desired(&mut shoot, spec) {
        debug!("Worker pool matches spec");
        return Ok(false);
    }

    shoots.update_shoot(&shoot).await?;
    info!(
        shoot = %shoot.name_any(),
        min = spec.min_nodes,
        max = spec.max_nodes,
        disk_size = spec.disk_size,
        "Corrected worker pool drift"
    );
    Ok(true)
}
