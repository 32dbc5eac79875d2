//! Client capabilities consumed by the reconciler
//!
//! The reconciler only talks to the outside world through the traits in this
//! module, so tests can substitute mocks and production wires in kube-backed
//! transports:
//! - [`ObjectStore`]: the local cluster (ShootCluster and Secret objects)
//! - [`ShootService`]: the provisioning backend (Shoots, CloudProfiles, credential secrets)
//! - [`ClientAccessor`]: hands out a [`ClientBundle`] per ShootCluster

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::annotations;
use crate::shoot::{CloudProfile, Shoot};
use crate::shootcluster::ShootCluster;

/// Error returned by every collaborator call, classified once at the transport boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Stale or expired resource version: another writer got there first
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match (ae.code, ae.reason.as_str()) {
                (404, _) => Self::NotFound(ae.message),
                (409, "AlreadyExists") => Self::AlreadyExists(ae.message),
                (409, _) | (410, _) => Self::Conflict(ae.message),
                _ => Self::Other(ae.message),
            },
            other => Self::Other(other.to_string()),
        }
    }
}

/// Local object store holding ShootClusters and their mirrored secrets
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Replace a ShootCluster (metadata and spec)
    async fn update_shoot_cluster(&self, shoot_cluster: &ShootCluster)
        -> Result<ShootCluster, ApiError>;

    /// Write the status subresource of a ShootCluster
    async fn patch_shoot_cluster_status(
        &self,
        shoot_cluster: &ShootCluster,
    ) -> Result<ShootCluster, ApiError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ApiError>;

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ApiError>;

    /// Replace a secret; fails with [`ApiError::Conflict`] on a stale resource version
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ApiError>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ApiError>;
}

/// Managed cluster service of the provisioning backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShootService: Send + Sync {
    async fn create_shoot(&self, shoot: &Shoot) -> Result<Shoot, ApiError>;

    async fn get_shoot(&self, namespace: &str, name: &str) -> Result<Shoot, ApiError>;

    async fn update_shoot(&self, shoot: &Shoot) -> Result<Shoot, ApiError>;

    /// Request deletion of a Shoot
    async fn delete_shoot(&self, namespace: &str, name: &str) -> Result<(), ApiError>;

    async fn get_cloud_profile(&self, name: &str) -> Result<CloudProfile, ApiError>;

    /// Read a secret generated by the backend (e.g. Shoot credentials)
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ApiError>;

    /// Check that the backend API answers
    async fn check_readiness(&self) -> Result<bool, ApiError>;
}

/// Clients scoped to one ShootCluster
#[derive(Clone)]
pub struct ClientBundle {
    pub store: Arc<dyn ObjectStore>,
    pub shoots: Arc<dyn ShootService>,
}

/// Derives the client bundle for a ShootCluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientAccessor: Send + Sync {
    /// Bundle for the given ShootCluster, `None` when clients cannot be built
    async fn get(&self, shoot_cluster: &ShootCluster) -> Option<ClientBundle>;

    /// Drop cached clients once a ShootCluster is gone
    fn forget(&self, shoot_cluster: &ShootCluster);

    /// Whether the backend can currently be reached
    async fn check_readiness(&self) -> Result<bool, ApiError>;
}

/// [`ObjectStore`] backed by the local cluster's API server
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn shoot_clusters(&self, namespace: &str) -> Api<ShootCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, ApiError> {
    obj.namespace()
        .ok_or_else(|| ApiError::Other(format!("{} has no namespace", obj.name_any())))
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    #[instrument(skip(self, shoot_cluster), fields(name = %shoot_cluster.name_any()))]
    async fn update_shoot_cluster(
        &self,
        shoot_cluster: &ShootCluster,
    ) -> Result<ShootCluster, ApiError> {
        let ns = namespace_of(shoot_cluster)?;
        let updated = self
            .shoot_clusters(&ns)
            .replace(&shoot_cluster.name_any(), &PostParams::default(), shoot_cluster)
            .await?;
        debug!(resource_version = ?updated.resource_version(), "Updated ShootCluster");
        Ok(updated)
    }

    #[instrument(skip(self, shoot_cluster), fields(name = %shoot_cluster.name_any()))]
    async fn patch_shoot_cluster_status(
        &self,
        shoot_cluster: &ShootCluster,
    ) -> Result<ShootCluster, ApiError> {
        let ns = namespace_of(shoot_cluster)?;
        let patch = serde_json::json!({
            "status": shoot_cluster.status
        });
        let updated = self
            .shoot_clusters(&ns)
            .patch_status(
                &shoot_cluster.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ApiError> {
        Ok(self.secrets(namespace).get(name).await?)
    }

    #[instrument(skip(self, secret), fields(name = %secret.name_any()))]
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, ApiError> {
        let ns = namespace_of(secret)?;
        Ok(self
            .secrets(&ns)
            .create(&PostParams::default(), secret)
            .await?)
    }

    #[instrument(skip(self, secret), fields(name = %secret.name_any()))]
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, ApiError> {
        let ns = namespace_of(secret)?;
        Ok(self
            .secrets(&ns)
            .replace(&secret.name_any(), &PostParams::default(), secret)
            .await?)
    }

    #[instrument(skip(self))]
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// [`ShootService`] backed by the provisioning backend's API server
pub struct GardenClient {
    client: Client,
}

impl GardenClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn shoots(&self, namespace: &str) -> Api<Shoot> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ShootService for GardenClient {
    #[instrument(skip(self, shoot), fields(shoot = %shoot.name_any()))]
    async fn create_shoot(&self, shoot: &Shoot) -> Result<Shoot, ApiError> {
        let ns = namespace_of(shoot)?;
        Ok(self
            .shoots(&ns)
            .create(&PostParams::default(), shoot)
            .await?)
    }

    #[instrument(skip(self))]
    async fn get_shoot(&self, namespace: &str, name: &str) -> Result<Shoot, ApiError> {
        Ok(self.shoots(namespace).get(name).await?)
    }

    #[instrument(skip(self, shoot), fields(shoot = %shoot.name_any()))]
    async fn update_shoot(&self, shoot: &Shoot) -> Result<Shoot, ApiError> {
        let ns = namespace_of(shoot)?;
        Ok(self
            .shoots(&ns)
            .replace(&shoot.name_any(), &PostParams::default(), shoot)
            .await?)
    }

    #[instrument(skip(self))]
    async fn delete_shoot(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        let api = self.shoots(namespace);

        // The backend rejects deletion of Shoots that lack the confirmation annotation
        let confirmation = BTreeMap::from([(annotations::CONFIRM_DELETION, "true")]);
        let patch = serde_json::json!({
            "metadata": {
                "annotations": confirmation
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        api.delete(name, &DeleteParams::default()).await?;
        debug!(shoot = %name, namespace = %namespace, "Requested shoot deletion");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_cloud_profile(&self, name: &str) -> Result<CloudProfile, ApiError> {
        let api: Api<CloudProfile> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    #[instrument(skip(self))]
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ApiError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn check_readiness(&self) -> Result<bool, ApiError> {
        let version = self.client.apiserver_version().await?;
        debug!(git_version = %version.git_version, "Backend readiness check: OK");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_classify_not_found() {
        let err = ApiError::from(api_error(404, "NotFound"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: NotFound happened");
    }

    #[test]
    fn test_classify_already_exists() {
        let err = ApiError::from(api_error(409, "AlreadyExists"));
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_classify_conflict_and_expired() {
        assert!(ApiError::from(api_error(409, "Conflict")).is_conflict());
        assert!(ApiError::from(api_error(410, "Expired")).is_conflict());
    }

    #[test]
    fn test_classify_other() {
        let err = ApiError::from(api_error(500, "InternalError"));
        assert!(matches!(err, ApiError::Other(_)));
        assert!(!err.is_not_found());
        assert!(!err.is_conflict());
    }
}
