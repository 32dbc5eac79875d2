//! ShootCluster CRD describing a desired managed cluster

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ShootCluster spec - the size and placement of the desired cluster
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "shootoperator.io",
    version = "v1alpha1",
    kind = "ShootCluster",
    plural = "shootclusters",
    shortname = "sc",
    namespaced = true,
    status = "ShootClusterStatus",
    printcolumn = r#"{"name":"Shoot", "type":"string", "jsonPath":".spec.shootName"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".status.secretName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ShootClusterSpec {
    /// Name of the Shoot created on the provisioning backend
    pub shoot_name: String,
    /// Backend namespace (project) the Shoot lives in
    pub gardener_namespace: String,
    /// Lower bound of the worker pool autoscaler
    pub min_nodes: i32,
    /// Upper bound of the worker pool autoscaler
    pub max_nodes: i32,
    /// Worker volume size in GiB
    pub disk_size: i32,
}

/// Lifecycle state of a ShootCluster
///
/// Unrecognised values read back as [`ShootClusterState::Unset`] so the next
/// sync re-initializes them instead of the object failing to deserialize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub enum ShootClusterState {
    /// Never reconciled
    #[default]
    #[serde(rename = "")]
    Unset,
    Creating,
    Ready,
    Error,
}

impl ShootClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Creating => "Creating",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }
}

impl<'de> Deserialize<'de> for ShootClusterState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "Creating" => Self::Creating,
            "Ready" => Self::Ready,
            "Error" => Self::Error,
            "" => Self::Unset,
            other => {
                tracing::warn!(state = other, "Unknown ShootCluster state, treating as unset");
                Self::Unset
            }
        })
    }
}

impl std::fmt::Display for ShootClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ShootCluster status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShootClusterStatus {
    /// Current lifecycle state
    #[serde(default)]
    pub state: ShootClusterState,
    /// Human-readable detail for the current state
    #[serde(default)]
    pub message: String,
    /// Name of the secret mirroring the cluster credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

impl ShootCluster {
    /// Current state, `Unset` when no status has been written yet
    pub fn state(&self) -> ShootClusterState {
        self.status
            .as_ref()
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Status for in-place mutation, created on first access
    pub fn status_mut(&mut self) -> &mut ShootClusterStatus {
        self.status.get_or_insert_with(ShootClusterStatus::default)
    }

    /// Move into `Error` with a message
    pub fn set_error(&mut self, message: impl Into<String>) {
        let status = self.status_mut();
        status.state = ShootClusterState::Error;
        status.message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_shootcluster_spec() {
        let yaml = r#"
shootName: build-42
gardenerNamespace: garden-ci
minNodes: 1
maxNodes: 5
diskSize: 100
"#;
        let spec: ShootClusterSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.shoot_name, "build-42");
        assert_eq!(spec.gardener_namespace, "garden-ci");
        assert_eq!(spec.min_nodes, 1);
        assert_eq!(spec.max_nodes, 5);
        assert_eq!(spec.disk_size, 100);
    }

    #[test]
    fn test_unset_state_serializes_as_empty_string() {
        let status = ShootClusterStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "");
        assert_eq!(json["message"], "");
        assert!(json.get("secretName").is_none());
    }

    #[test]
    fn test_unknown_state_reads_as_unset() {
        let yaml = r#"
state: Provisioning
message: edited by hand
"#;
        let status: ShootClusterStatus = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(status.state, ShootClusterState::Unset);
        assert_eq!(status.message, "edited by hand");
    }

    #[test]
    fn test_status_round_trips_known_states() {
        let yaml = r#"
state: Ready
message: ""
secretName: demo-shoot-credentials
"#;
        let status: ShootClusterStatus = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(status.state, ShootClusterState::Ready);
        assert_eq!(status.secret_name.as_deref(), Some("demo-shoot-credentials"));
    }

    #[test]
    fn test_state_defaults_to_unset_without_status() {
        let sc = ShootCluster::new(
            "demo",
            ShootClusterSpec {
                shoot_name: "demo".to_string(),
                gardener_namespace: "garden-ci".to_string(),
                min_nodes: 1,
                max_nodes: 3,
                disk_size: 50,
            },
        );
        assert_eq!(sc.state(), ShootClusterState::Unset);
    }

    #[test]
    fn test_set_error_creates_status() {
        let mut sc = ShootCluster::new(
            "demo",
            ShootClusterSpec {
                shoot_name: "demo".to_string(),
                gardener_namespace: "garden-ci".to_string(),
                min_nodes: 1,
                max_nodes: 3,
                disk_size: 50,
            },
        );
        sc.set_error("boom");
        assert_eq!(sc.state(), ShootClusterState::Error);
        assert_eq!(sc.status.as_ref().unwrap().message, "boom");
    }
}
