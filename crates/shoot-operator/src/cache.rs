//! Client cache backing [`ClientAccessor`] in production
//!
//! The backend client is built lazily from the kubeconfig secret referenced in
//! the operator configuration and shared by every ShootCluster. Bundles are
//! cached per ShootCluster UID until the ShootCluster is deleted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Api, Client, Config, ResourceExt};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{
    ApiError, ClientAccessor, ClientBundle, GardenClient, KubeObjectStore, ShootService,
};
use crate::config::SecretReference;
use crate::shootcluster::ShootCluster;

/// Key holding the backend kubeconfig in the referenced secret
pub const KUBECONFIG_KEY: &str = "kubeconfig";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("couldn't read secret {namespace}/{name}: {source}")]
    Secret {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("secret {0} has no kubeconfig key")]
    MissingKubeconfig(String),
    #[error("kubeconfig is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),
    #[error("couldn't build backend client: {0}")]
    Client(#[from] kube::Error),
}

/// Parse the backend kubeconfig stored in a secret
pub fn kubeconfig_from_secret(secret: &Secret) -> Result<Kubeconfig, CacheError> {
    let raw = secret
        .data
        .as_ref()
        .and_then(|d| d.get(KUBECONFIG_KEY))
        .ok_or_else(|| CacheError::MissingKubeconfig(secret.name_any()))?;
    let yaml = std::str::from_utf8(&raw.0)?;
    Ok(Kubeconfig::from_yaml(yaml)?)
}

pub struct ClientCache {
    local: Client,
    secret_ref: SecretReference,
    garden: RwLock<Option<Arc<GardenClient>>>,
    bundles: RwLock<HashMap<String, ClientBundle>>,
}

impl ClientCache {
    pub fn new(local: Client, secret_ref: SecretReference) -> Self {
        Self {
            local,
            secret_ref,
            garden: RwLock::new(None),
            bundles: RwLock::new(HashMap::new()),
        }
    }

    async fn garden_client(&self) -> Result<Arc<GardenClient>, CacheError> {
        let cached = self.garden.read().clone();
        if let Some(client) = cached {
            return Ok(client);
        }

        let SecretReference { name, namespace } = &self.secret_ref;
        let secrets: Api<Secret> = Api::namespaced(self.local.clone(), namespace);
        let secret = secrets
            .get(name)
            .await
            .map_err(|source| CacheError::Secret {
                namespace: namespace.clone(),
                name: name.clone(),
                source,
            })?;

        let kubeconfig = kubeconfig_from_secret(&secret)?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let cluster_url = config.cluster_url.to_string();
        let client = Arc::new(GardenClient::new(Client::try_from(config)?));

        info!(cluster_url = %cluster_url, "Connected to provisioning backend");
        *self.garden.write() = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl ClientAccessor for ClientCache {
    async fn get(&self, shoot_cluster: &ShootCluster) -> Option<ClientBundle> {
        let Some(uid) = shoot_cluster.uid() else {
            warn!(name = %shoot_cluster.name_any(), "ShootCluster has no UID");
            return None;
        };

        let cached = self.bundles.read().get(&uid).cloned();
        if cached.is_some() {
            return cached;
        }

        let garden = match self.garden_client().await {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Backend client unavailable");
                return None;
            }
        };

        let bundle = ClientBundle {
            store: Arc::new(KubeObjectStore::new(self.local.clone())),
            shoots: garden,
        };
        self.bundles.write().insert(uid.clone(), bundle.clone());
        debug!(uid = %uid, "Cached clients for ShootCluster");
        Some(bundle)
    }

    fn forget(&self, shoot_cluster: &ShootCluster) {
        if let Some(uid) = shoot_cluster.uid() {
            self.bundles.write().remove(&uid);
        }
    }

    async fn check_readiness(&self) -> Result<bool, ApiError> {
        let garden = self
            .garden_client()
            .await
            .map_err(|e| ApiError::Other(e.to_string()))?;
        garden.check_readiness().await
    }
}
