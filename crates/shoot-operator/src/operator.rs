//! Reconciliation flows for a single ShootCluster
//!
//! [`ShootOperator::sync`] drives a ShootCluster towards a ready Shoot with
//! mirrored credentials. [`ShootOperator::delete`] tears everything down before
//! releasing the finalizer. Both flows mutate the ShootCluster they are given
//! in place; persisting status is left to the caller via
//! [`ShootOperator::persist_status`].
//!
//! Every step can be re-run. A failed invocation is retried from the top on
//! the next trigger.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::client::{ApiError, ClientAccessor, ClientBundle};
use crate::config::ShootOperatorConfigSpec;
use crate::credentials::{self, CredentialError};
use crate::deletion;
use crate::drift;
use crate::provision::{self, ProvisionError, Provisioned};
use crate::shootcluster::{ShootCluster, ShootClusterState, ShootClusterStatus};
use crate::status;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("couldn't get clients for ShootCluster {0}")]
    ClientUnavailable(String),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("couldn't add finalizer: {0}")]
    Finalizer(#[source] ApiError),
    #[error("couldn't check shoot readiness: {0}")]
    Readiness(#[source] ApiError),
    #[error("couldn't fetch shoot credentials: {0}")]
    Credentials(#[from] CredentialError),
    #[error("couldn't reconcile shoot spec: {0}")]
    Drift(#[source] ApiError),
    #[error("couldn't delete credentials secret: {0}")]
    SecretCleanup(#[source] ApiError),
    #[error("couldn't remove finalizers: {0}")]
    FinalizerRelease(#[source] ApiError),
    #[error("couldn't update status: {0}")]
    Status(#[source] ApiError),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl OperatorError {
    /// Errors that cannot recover until the ShootCluster itself changes
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_)
                | Self::Provision(ProvisionError::InvalidSpec(_))
                | Self::Provision(ProvisionError::UnusableProfile { .. })
        )
    }
}

pub struct ShootOperator {
    accessor: Arc<dyn ClientAccessor>,
    config: Arc<ShootOperatorConfigSpec>,
}

impl ShootOperator {
    pub fn new(accessor: Arc<dyn ClientAccessor>, config: Arc<ShootOperatorConfigSpec>) -> Self {
        Self { accessor, config }
    }

    pub fn finalizer(&self) -> &str {
        &self.config.finalizer
    }

    /// Whether the ShootCluster is being deleted and still waits for our cleanup
    pub fn is_deleting(&self, shoot_cluster: &ShootCluster) -> bool {
        shoot_cluster.metadata.deletion_timestamp.is_some()
            && shoot_cluster
                .finalizers()
                .iter()
                .any(|f| f == self.finalizer())
    }

    async fn clients(&self, shoot_cluster: &ShootCluster) -> Result<ClientBundle, OperatorError> {
        self.accessor
            .get(shoot_cluster)
            .await
            .ok_or_else(|| OperatorError::ClientUnavailable(shoot_cluster.name_any()))
    }

    /// Drive the ShootCluster towards a ready Shoot with mirrored credentials
    #[instrument(skip_all, fields(name = %shoot_cluster.name_any(), namespace = ?shoot_cluster.namespace()))]
    pub async fn sync(&self, shoot_cluster: &mut ShootCluster) -> Result<(), OperatorError> {
        let started = Instant::now();
        let result = self.run_sync(shoot_cluster).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => info!(
                elapsed_ms,
                state = %shoot_cluster.state(),
                "Synced ShootCluster"
            ),
            Err(e) => error!(elapsed_ms, error = %e, "Sync failed"),
        }
        result
    }

    async fn run_sync(&self, shoot_cluster: &mut ShootCluster) -> Result<(), OperatorError> {
        let clients = self.clients(shoot_cluster).await?;

        match provision::create_shoot(
            clients.shoots.as_ref(),
            shoot_cluster,
            &self.config.provisioning,
        )
        .await?
        {
            Provisioned::Created(shoot) => {
                debug!(shoot = %shoot.name_any(), "Shoot creation accepted")
            }
            Provisioned::AlreadyExists => {}
        }

        if !shoot_cluster.finalizers().iter().any(|f| f == self.finalizer()) {
            shoot_cluster
                .metadata
                .finalizers
                .get_or_insert_with(Vec::new)
                .push(self.finalizer().to_string());
            let updated = clients
                .store
                .update_shoot_cluster(shoot_cluster)
                .await
                .map_err(OperatorError::Finalizer)?;
            shoot_cluster.metadata = updated.metadata;
            debug!(finalizer = %self.finalizer(), "Added finalizer");
        }

        status::initialize(shoot_cluster);
        status::check_readiness_and_update(clients.shoots.as_ref(), shoot_cluster)
            .await
            .map_err(OperatorError::Readiness)?;

        if shoot_cluster.state() == ShootClusterState::Ready {
            let creds =
                match credentials::fetch_credentials(clients.shoots.as_ref(), shoot_cluster).await
                {
                    Ok(creds) => creds,
                    Err(e) => {
                        shoot_cluster.set_error(format!("couldn't fetch credentials. err: {}", e));
                        return Err(e.into());
                    }
                };
            credentials::sync_secret(clients.store.as_ref(), shoot_cluster, &creds).await;
        }

        drift::reconcile_spec(clients.shoots.as_ref(), &shoot_cluster.spec)
            .await
            .map_err(OperatorError::Drift)?;

        Ok(())
    }

    /// Delete the Shoot and the mirrored secret, then release the ShootCluster
    #[instrument(skip_all, fields(name = %shoot_cluster.name_any(), namespace = ?shoot_cluster.namespace()))]
    pub async fn delete(&self, shoot_cluster: &mut ShootCluster) -> Result<(), OperatorError> {
        let clients = self.clients(shoot_cluster).await?;

        deletion::request_shoot_deletion(clients.shoots.as_ref(), shoot_cluster).await;

        deletion::delete_mirrored_secret(clients.store.as_ref(), shoot_cluster)
            .await
            .map_err(OperatorError::SecretCleanup)?;

        deletion::release_finalizers(clients.store.as_ref(), shoot_cluster)
            .await
            .map_err(OperatorError::FinalizerRelease)?;

        self.accessor.forget(shoot_cluster);
        info!("ShootCluster cleanup complete");
        Ok(())
    }

    /// Write the status subresource when it differs from `previous`
    ///
    /// Returns whether a write was issued.
    pub async fn persist_status(
        &self,
        shoot_cluster: &ShootCluster,
        previous: Option<&ShootClusterStatus>,
    ) -> Result<bool, OperatorError> {
        if shoot_cluster.status.as_ref() == previous {
            debug!(name = %shoot_cluster.name_any(), "Status unchanged");
            return Ok(false);
        }

        let clients = self.clients(shoot_cluster).await?;
        clients
            .store
            .patch_shoot_cluster_status(shoot_cluster)
            .await
            .map_err(OperatorError::Status)?;
        Ok(true)
    }
}
