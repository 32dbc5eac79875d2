//! Operator configuration CRD and well-known names

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a Kubernetes Secret
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
}

/// Network ranges for newly provisioned Shoots
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default = "default_vpc_cidr")]
    pub vpc_cidr: String,
    #[serde(default = "default_vpc_cidr")]
    pub nodes: String,
    #[serde(default = "default_pods_cidr")]
    pub pods: String,
    #[serde(default = "default_services_cidr")]
    pub services: String,
    #[serde(default = "default_internal_cidr")]
    pub internal: String,
    #[serde(default = "default_public_cidr")]
    pub public: String,
    #[serde(default = "default_workers_cidr")]
    pub workers: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vpc_cidr: default_vpc_cidr(),
            nodes: default_vpc_cidr(),
            pods: default_pods_cidr(),
            services: default_services_cidr(),
            internal: default_internal_cidr(),
            public: default_public_cidr(),
            workers: default_workers_cidr(),
        }
    }
}

fn default_vpc_cidr() -> String {
    "10.250.0.0/16".to_string()
}

fn default_pods_cidr() -> String {
    "100.96.0.0/11".to_string()
}

fn default_services_cidr() -> String {
    "100.64.0.0/13".to_string()
}

fn default_internal_cidr() -> String {
    "10.250.112.0/22".to_string()
}

fn default_public_cidr() -> String {
    "10.250.96.0/22".to_string()
}

fn default_workers_cidr() -> String {
    "10.250.0.0/19".to_string()
}

/// How new Shoots are laid out on the infrastructure
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningConfig {
    /// CloudProfile to validate against and pick defaults from
    #[serde(default = "default_cloud_profile")]
    pub cloud_profile: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// SecretBinding granting access to the infrastructure account
    pub secret_binding_name: String,
    /// Pin a Kubernetes version instead of the newest one offered
    #[serde(default)]
    pub kubernetes_version: Option<String>,
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub volume_type: Option<String>,
    #[serde(default)]
    pub machine_image: Option<String>,
    #[serde(default)]
    pub networks: NetworkConfig,
}

fn default_cloud_profile() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "eu-central-1".to_string()
}

/// Requeue intervals after a successful reconcile
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequeueConfig {
    /// While the Shoot is still being created (seconds)
    #[serde(default = "default_creating_seconds")]
    pub creating_seconds: u64,
    /// Once Ready or Error (seconds)
    #[serde(default = "default_steady_seconds")]
    pub steady_seconds: u64,
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            creating_seconds: default_creating_seconds(),
            steady_seconds: default_steady_seconds(),
        }
    }
}

fn default_creating_seconds() -> u64 {
    30
}

fn default_steady_seconds() -> u64 {
    300 // 5 minutes
}

/// ShootOperatorConfig spec
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "shootoperator.io",
    version = "v1alpha1",
    kind = "ShootOperatorConfig",
    plural = "shootoperatorconfigs",
    shortname = "soc",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ShootOperatorConfigSpec {
    /// Finalizer placed on every provisioned ShootCluster
    #[serde(default = "default_finalizer")]
    pub finalizer: String,
    /// Secret holding the kubeconfig for the provisioning backend
    pub garden_kubeconfig_secret_ref: SecretReference,
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub requeue: RequeueConfig,
}

fn default_finalizer() -> String {
    "shootoperator.io/finalizer".to_string()
}

/// Annotations used by the operator
pub mod annotations {
    /// Backend refuses to delete a Shoot unless this is "true"
    pub const CONFIRM_DELETION: &str = "confirmation.garden.sapcloud.io/deletion";
}

/// Labels placed on mirrored secrets
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const MANAGED_BY_VALUE: &str = "shoot-operator";
    /// Name of the ShootCluster a secret belongs to
    pub const SHOOT_CLUSTER: &str = "shootoperator.io/shoot-cluster";
}
