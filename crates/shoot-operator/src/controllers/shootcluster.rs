//! ShootCluster controller
//!
//! Watches shootoperator.io/v1alpha1 ShootCluster resources (and the secrets
//! they own) and hands each one to [`ShootOperator`](crate::operator::ShootOperator).
//!
//! ## Deletion Handling
//!
//! A ShootCluster with a deletion timestamp and our finalizer runs the delete
//! flow. When the finalizer is already gone there is nothing left to clean up
//! and the object is left to the API server.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::Client as KubeClient;
use tracing::{debug, info, instrument, warn};

use crate::config::RequeueConfig;
use crate::operator::OperatorError;
use crate::shootcluster::{ShootCluster, ShootClusterState};

use super::retry::{compute_backoff, ErrorKind};
use super::ControllerContext;

/// How long to wait before looking at a healthy ShootCluster again
fn requeue_after(state: ShootClusterState, requeue: &RequeueConfig) -> Action {
    let secs = match state {
        ShootClusterState::Creating | ShootClusterState::Unset => requeue.creating_seconds,
        ShootClusterState::Ready | ShootClusterState::Error => requeue.steady_seconds,
    };
    Action::requeue(Duration::from_secs(secs))
}

/// Reconcile a single ShootCluster resource
#[instrument(
    skip(ctx, shoot_cluster),
    fields(
        name = %shoot_cluster.metadata.name.as_deref().unwrap_or("unknown"),
        namespace = %shoot_cluster.metadata.namespace.as_deref().unwrap_or("default")
    )
)]
async fn reconcile(
    shoot_cluster: Arc<ShootCluster>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, OperatorError> {
    shoot_cluster
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| OperatorError::MissingField("metadata.name".to_string()))?;
    shoot_cluster
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| OperatorError::MissingField("metadata.namespace".to_string()))?;
    let uid = shoot_cluster
        .metadata
        .uid
        .as_deref()
        .ok_or_else(|| OperatorError::MissingField("metadata.uid".to_string()))?;

    let mut working = (*shoot_cluster).clone();

    if working.metadata.deletion_timestamp.is_some() {
        if !ctx.operator.is_deleting(&working) {
            debug!("Finalizer already released, nothing to clean up");
            return Ok(Action::await_change());
        }
        info!("Deleting ShootCluster");
        ctx.operator.delete(&mut working).await?;
        ctx.retry_tracker.reset(uid);
        return Ok(Action::await_change());
    }

    info!(
        shoot = %working.spec.shoot_name,
        state = %working.state(),
        "Reconciling ShootCluster"
    );

    let synced = ctx.operator.sync(&mut working).await;
    let persisted = ctx
        .operator
        .persist_status(&working, shoot_cluster.status.as_ref())
        .await;

    match (synced, persisted) {
        (Err(e), Err(status_err)) => {
            warn!(error = %status_err, "Failed to persist status after failed sync");
            return Err(e);
        }
        (Err(e), Ok(_)) | (Ok(()), Err(e)) => return Err(e),
        (Ok(()), Ok(_)) => {}
    }

    ctx.retry_tracker.reset(uid);
    Ok(requeue_after(working.state(), &ctx.config.requeue))
}

fn classify_error(error: &OperatorError) -> ErrorKind {
    if error.is_permanent() {
        ErrorKind::Permanent
    } else {
        ErrorKind::Transient
    }
}

/// Error policy for the controller with exponential backoff
fn error_policy(
    shoot_cluster: Arc<ShootCluster>,
    error: &OperatorError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let uid = shoot_cluster.metadata.uid.as_deref().unwrap_or("unknown");
    let kind = classify_error(error);
    let attempt = ctx.retry_tracker.increment(uid);

    warn!(
        name = %shoot_cluster.metadata.name.as_deref().unwrap_or("unknown"),
        error = %error,
        attempt = attempt,
        error_kind = ?kind,
        "ShootCluster reconciliation failed"
    );

    compute_backoff(attempt, kind)
}

/// Start the ShootCluster controller
pub async fn run(client: KubeClient, ctx: Arc<ControllerContext>) {
    let shoot_clusters: Api<ShootCluster> = Api::all(client.clone());
    let secrets: Api<Secret> = Api::all(client);

    info!("Starting ShootCluster controller");

    Controller::new(shoot_clusters, WatcherConfig::default())
        .owns(secrets, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!(name = %obj.name, "ShootCluster reconciled successfully");
                }
                Err(e) => {
                    warn!(error = %e, "ShootCluster controller error");
                }
            }
        })
        .await;
}
