//! Provisioning backend resources
//!
//! Typed subsets of the `garden.sapcloud.io/v1beta1` Shoot and CloudProfile kinds.
//! Only the fields the operator reads or writes are modelled; everything else is
//! kept in the flattened `extra` maps so a read-modify-update cycle never drops
//! fields owned by the backend.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shoot spec
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "garden.sapcloud.io",
    version = "v1beta1",
    kind = "Shoot",
    plural = "shoots",
    namespaced,
    status = "ShootStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    pub cloud: Cloud,
    pub kubernetes: KubernetesConfig,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Cloud placement of a Shoot
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cloud {
    /// CloudProfile the Shoot is validated against
    pub profile: String,
    pub region: String,
    /// Binding to the infrastructure account credentials
    pub secret_binding_ref: LocalReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsCloud>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalReference {
    pub name: String,
}

/// AWS-specific Shoot configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCloud {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_image: Option<MachineImage>,
    pub networks: AwsNetworks,
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineImage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ami: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsNetworks {
    pub vpc: Vpc,
    pub nodes: String,
    pub pods: String,
    pub services: String,
    #[serde(default)]
    pub internal: Vec<String>,
    #[serde(default)]
    pub public: Vec<String>,
    #[serde(default)]
    pub workers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Worker pool of a Shoot
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub name: String,
    pub machine_type: String,
    pub auto_scaler_min: i32,
    pub auto_scaler_max: i32,
    /// Size with unit suffix, e.g. `100Gi`
    pub volume_size: String,
    pub volume_type: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KubernetesConfig {
    pub version: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Observed Shoot state as reported by the backend
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Most recent operation the backend performed on a Shoot
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    /// Create, Reconcile, Delete, ...
    #[serde(rename = "type")]
    pub type_: String,
    /// Processing, Succeeded, Error, Failed, ...
    pub state: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub progress: i32,
}

/// CloudProfile spec (cluster-scoped)
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "garden.sapcloud.io",
    version = "v1beta1",
    kind = "CloudProfile",
    plural = "cloudprofiles",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct CloudProfileSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsProfile>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AwsProfile {
    pub constraints: AwsConstraints,
}

/// What an AWS profile allows Shoots to use
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsConstraints {
    #[serde(default)]
    pub kubernetes: KubernetesConstraints,
    #[serde(default)]
    pub machine_images: Vec<NamedEntry>,
    #[serde(default)]
    pub machine_types: Vec<NamedEntry>,
    #[serde(default)]
    pub volume_types: Vec<NamedEntry>,
    #[serde(default)]
    pub zones: Vec<ProfileZone>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KubernetesConstraints {
    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedEntry {
    pub name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileZone {
    pub region: String,
    #[serde(default)]
    pub names: Vec<String>,
}

impl Shoot {
    /// First worker pool, the only one the operator manages
    pub fn first_worker_mut(&mut self) -> Option<&mut Worker> {
        self.spec
            .cloud
            .aws
            .as_mut()
            .and_then(|aws| aws.workers.first_mut())
    }
}
