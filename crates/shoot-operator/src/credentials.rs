//! Mirroring of Shoot credentials into the ShootCluster's namespace
//!
//! Once a Shoot is Ready the backend publishes a `<shoot>.kubeconfig` secret.
//! Its credential fields are copied into a secret next to the ShootCluster.
//! Writes only happen when a tracked field differs byte for byte, and only the
//! tracked fields are overwritten on an existing secret.
//!
//! Failures never propagate from [`sync_secret`]; they end up in the
//! ShootCluster status instead. A stale resource version means another writer
//! already applied an equivalent change and is left for the next sync.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::client::{ApiError, ObjectStore, ShootService};
use crate::config::labels;
use crate::shootcluster::ShootCluster;

/// Source key in the backend secret -> key in the mirrored secret
pub const CREDENTIAL_FIELDS: [(&str, &str); 6] = [
    ("kubeconfig", "kubeconfig"),
    ("kubecfg.key", "kubecfg-key"),
    ("ca.crt", "ca-crt"),
    ("kubecfg.crt", "kubecfg-crt"),
    ("username", "username"),
    ("password", "password"),
];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("couldn't fetch the credentials secret: {0}")]
    Api(#[from] ApiError),
    #[error("secret for '{0}' does not have a kubeconfig")]
    MissingKubeconfig(String),
}

/// Name of the mirrored secret for a ShootCluster
pub fn secret_name(shoot_cluster: &ShootCluster) -> String {
    format!("{}-shoot-credentials", shoot_cluster.name_any())
}

/// Fetch the credentials the backend generated for the Shoot
#[instrument(skip_all, fields(shoot = %shoot_cluster.spec.shoot_name))]
pub async fn fetch_credentials(
    shoots: &dyn ShootService,
    shoot_cluster: &ShootCluster,
) -> Result<Secret, CredentialError> {
    let name = format!("{}.kubeconfig", shoot_cluster.spec.shoot_name);
    let secret = shoots
        .get_secret(&shoot_cluster.spec.gardener_namespace, &name)
        .await
        .inspect_err(|e| error!(secret = %name, error = %e, "Couldn't fetch the secret for the shoot"))?;

    let has_kubeconfig = secret
        .data
        .as_ref()
        .is_some_and(|d| d.contains_key("kubeconfig"));
    if !has_kubeconfig {
        return Err(CredentialError::MissingKubeconfig(
            shoot_cluster.spec.shoot_name.clone(),
        ));
    }

    Ok(secret)
}

/// Build the secret we want from the fetched credentials
pub fn desired_secret(shoot_cluster: &ShootCluster, credentials: &Secret) -> Secret {
    let source = credentials.data.clone().unwrap_or_default();
    let data: BTreeMap<String, ByteString> = CREDENTIAL_FIELDS
        .iter()
        .map(|(from, to)| {
            let value = source
                .get(*from)
                .cloned()
                .unwrap_or_else(|| ByteString(Vec::new()));
            (to.to_string(), value)
        })
        .collect();

    let owner = shoot_cluster.controller_owner_ref(&()).into_iter().collect::<Vec<_>>();

    Secret {
        metadata: ObjectMeta {
            name: Some(secret_name(shoot_cluster)),
            namespace: shoot_cluster.namespace(),
            labels: Some(BTreeMap::from([
                (
                    labels::MANAGED_BY.to_string(),
                    labels::MANAGED_BY_VALUE.to_string(),
                ),
                (labels::SHOOT_CLUSTER.to_string(), shoot_cluster.name_any()),
            ])),
            owner_references: (!owner.is_empty()).then_some(owner),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// Copy every desired field that is missing or different into `existing`
///
/// Returns whether anything changed. Keys only present in `existing` are kept.
pub fn merge_changed(
    desired: &BTreeMap<String, ByteString>,
    existing: &mut BTreeMap<String, ByteString>,
) -> bool {
    let mut changed = false;
    for (key, value) in desired {
        if existing.get(key) != Some(value) {
            existing.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Reconcile the mirrored secret with freshly fetched credentials
#[instrument(skip_all, fields(name = %shoot_cluster.name_any()))]
pub async fn sync_secret(
    store: &dyn ObjectStore,
    shoot_cluster: &mut ShootCluster,
    credentials: &Secret,
) {
    let desired = desired_secret(shoot_cluster, credentials);
    let name = secret_name(shoot_cluster);
    let namespace = shoot_cluster.namespace().unwrap_or_default();

    let existing = match store.get_secret(&namespace, &name).await {
        Ok(secret) => Some(secret),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            error!(secret = %name, error = %e, "Couldn't check secret");
            shoot_cluster.set_error(format!("couldn't check secret. err: {}", e));
            return;
        }
    };

    match existing {
        None => match store.create_secret(&desired).await {
            Ok(_) => {
                info!(secret = %name, "Created credentials secret");
                shoot_cluster.status_mut().secret_name = Some(name);
            }
            Err(e) if e.is_conflict() => {
                debug!(secret = %name, namespace = %namespace, "Resource expired for new secret");
            }
            Err(e) if e.is_already_exists() => {
                debug!(secret = %name, namespace = %namespace, "Secret created concurrently");
            }
            Err(e) => {
                error!(secret = %name, error = %e, "Creating credentials secret failed");
                shoot_cluster.set_error(format!("couldn't create secret. err: {}", e));
            }
        },
        Some(mut have) => {
            let want = desired.data.unwrap_or_default();
            let data = have.data.get_or_insert_with(BTreeMap::new);

            if !merge_changed(&want, data) {
                debug!(secret = %name, "Credentials secret is up to date");
                shoot_cluster.status_mut().secret_name = Some(name);
                return;
            }

            match store.update_secret(&have).await {
                Ok(_) => {
                    info!(secret = %name, "Updated credentials secret");
                    shoot_cluster.status_mut().secret_name = Some(name);
                }
                Err(e) if e.is_conflict() => {
                    debug!(secret = %name, namespace = %namespace, "Resource expired for secret");
                }
                Err(e) => {
                    error!(secret = %name, error = %e, "Updating credentials secret failed");
                    shoot_cluster.set_error(format!("couldn't update secret. err: {}", e));
                }
            }
        }
    }
}
