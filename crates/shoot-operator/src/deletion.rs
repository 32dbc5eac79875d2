//! Cleanup steps run when a ShootCluster is being deleted
//!
//! The steps are ordered by [`crate::operator::ShootOperator::delete`]. Each one
//! can be repeated: the Shoot deletion request is fire-and-forget, a missing
//! secret counts as deleted, and finalizers are only released once everything
//! before succeeded.

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::client::{ApiError, ObjectStore, ShootService};
use crate::credentials::secret_name;
use crate::shootcluster::ShootCluster;

/// Ask the backend to delete the Shoot; failures are logged and otherwise ignored
#[instrument(skip_all, fields(shoot = %shoot_cluster.spec.shoot_name, namespace = %shoot_cluster.spec.gardener_namespace))]
pub async fn request_shoot_deletion(shoots: &dyn ShootService, shoot_cluster: &ShootCluster) {
    let spec = &shoot_cluster.spec;
    match shoots
        .delete_shoot(&spec.gardener_namespace, &spec.shoot_name)
        .await
    {
        Ok(()) => info!("Requested shoot deletion"),
        Err(e) if e.is_not_found() => debug!("Shoot already gone"),
        Err(e) => warn!(error = %e, "Shoot deletion request failed"),
    }
}

/// Delete the mirrored credentials secret, treating NotFound as done
#[instrument(skip_all, fields(name = %shoot_cluster.name_any()))]
pub async fn delete_mirrored_secret(
    store: &dyn ObjectStore,
    shoot_cluster: &ShootCluster,
) -> Result<(), ApiError> {
    let name = secret_name(shoot_cluster);
    let namespace = shoot_cluster.namespace().unwrap_or_default();

    match store.delete_secret(&namespace, &name).await {
        Ok(()) => {
            info!(secret = %name, "Deleted credentials secret");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(secret = %name, "Credentials secret already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Clear every finalizer and persist the ShootCluster
#[instrument(skip_all, fields(name = %shoot_cluster.name_any()))]
pub async fn release_finalizers(
    store: &dyn ObjectStore,
    shoot_cluster: &mut ShootCluster,
) -> Result<(), ApiError> {
    let mut released = shoot_cluster.clone();
    released.metadata.finalizers = Some(Vec::new());
    let updated = store.update_shoot_cluster(&released).await?;
    shoot_cluster.metadata = updated.metadata;
    info!("Released finalizers");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockObjectStore, MockShootService};
    use crate::test_utils::{shoot_cluster, with_finalizer};

    #[tokio::test]
    async fn test_shoot_deletion_errors_are_swallowed() {
        for err in [
            ApiError::NotFound("shoots \"build-42\"".to_string()),
            ApiError::Other("connection reset".to_string()),
        ] {
            let mut shoots = MockShootService::new();
            shoots
                .expect_delete_shoot()
                .with(
                    mockall::predicate::eq("garden-ci"),
                    mockall::predicate::eq("build-42"),
                )
                .times(1)
                .return_once(move |_, _| Err(err));

            request_shoot_deletion(&shoots, &shoot_cluster(1, 3, 50)).await;
        }
    }

    #[tokio::test]
    async fn test_missing_secret_counts_as_deleted() {
        let mut store = MockObjectStore::new();
        store
            .expect_delete_secret()
            .with(
                mockall::predicate::eq("ci"),
                mockall::predicate::eq("demo-shoot-credentials"),
            )
            .times(1)
            .returning(|_, _| Err(ApiError::NotFound("secret".to_string())));

        assert!(delete_mirrored_secret(&store, &shoot_cluster(1, 3, 50))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_secret_delete_failure_propagates() {
        let mut store = MockObjectStore::new();
        store
            .expect_delete_secret()
            .returning(|_, _| Err(ApiError::Other("forbidden".to_string())));

        let err = delete_mirrored_secret(&store, &shoot_cluster(1, 3, 50))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Other(_)));
    }

    #[tokio::test]
    async fn test_release_finalizers_clears_all() {
        let mut sc = with_finalizer(shoot_cluster(1, 3, 50));
        sc.metadata
            .finalizers
            .as_mut()
            .unwrap()
            .push("other.io/finalizer".to_string());

        let mut store = MockObjectStore::new();
        store
            .expect_update_shoot_cluster()
            .times(1)
            .withf(|sc| sc.finalizers().is_empty())
            .returning(|sc| Ok(sc.clone()));

        release_finalizers(&store, &mut sc).await.unwrap();
        assert!(sc.finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_failed_release_keeps_finalizers() {
        let mut sc = with_finalizer(shoot_cluster(1, 3, 50));

        let mut store = MockObjectStore::new();
        store
            .expect_update_shoot_cluster()
            .returning(|_| Err(ApiError::Conflict("the object has been modified".to_string())));

        assert!(release_finalizers(&store, &mut sc).await.is_err());
        assert_eq!(sc.finalizers().len(), 1);
    }
}
