//! Shared fixtures for unit tests

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;

use crate::client::{ClientBundle, MockClientAccessor, MockObjectStore, MockShootService};
use crate::config::{
    NetworkConfig, ProvisioningConfig, RequeueConfig, SecretReference, ShootOperatorConfigSpec,
};
use crate::shoot::{
    AwsCloud, AwsConstraints, AwsNetworks, AwsProfile, Cloud, CloudProfile, CloudProfileSpec,
    KubernetesConfig, KubernetesConstraints, LastOperation, LocalReference, NamedEntry,
    ProfileZone, Shoot, ShootSpec, ShootStatus, Vpc, Worker,
};
use crate::shootcluster::{ShootCluster, ShootClusterSpec, ShootClusterState, ShootClusterStatus};

pub const FINALIZER: &str = "shootoperator.io/finalizer";

pub fn test_config() -> ShootOperatorConfigSpec {
    ShootOperatorConfigSpec {
        finalizer: FINALIZER.to_string(),
        garden_kubeconfig_secret_ref: SecretReference {
            name: "garden-kubeconfig".to_string(),
            namespace: "shoot-operator-system".to_string(),
        },
        provisioning: ProvisioningConfig {
            cloud_profile: "aws".to_string(),
            region: "eu-central-1".to_string(),
            secret_binding_name: "ci-aws".to_string(),
            kubernetes_version: None,
            machine_type: None,
            volume_type: None,
            machine_image: None,
            networks: NetworkConfig::default(),
        },
        requeue: RequeueConfig::default(),
    }
}

pub fn shoot_cluster(min: i32, max: i32, disk: i32) -> ShootCluster {
    let mut sc = ShootCluster::new(
        "demo",
        ShootClusterSpec {
            shoot_name: "build-42".to_string(),
            gardener_namespace: "garden-ci".to_string(),
            min_nodes: min,
            max_nodes: max,
            disk_size: disk,
        },
    );
    sc.metadata.namespace = Some("ci".to_string());
    sc.metadata.uid = Some("uid-123".to_string());
    sc
}

pub fn with_state(mut sc: ShootCluster, state: ShootClusterState) -> ShootCluster {
    sc.status = Some(ShootClusterStatus {
        state,
        ..Default::default()
    });
    sc
}

pub fn with_finalizer(mut sc: ShootCluster) -> ShootCluster {
    sc.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    sc
}

pub fn worker(min: i32, max: i32, volume: &str) -> Worker {
    Worker {
        name: "worker-1".to_string(),
        machine_type: "m5.large".to_string(),
        auto_scaler_min: min,
        auto_scaler_max: max,
        volume_size: volume.to_string(),
        volume_type: "gp2".to_string(),
        extra: BTreeMap::new(),
    }
}

pub fn shoot(workers: Vec<Worker>, last_operation: Option<(&str, &str)>) -> Shoot {
    let mut shoot = Shoot::new(
        "build-42",
        ShootSpec {
            cloud: Cloud {
                profile: "aws".to_string(),
                region: "eu-central-1".to_string(),
                secret_binding_ref: LocalReference {
                    name: "ci-aws".to_string(),
                },
                aws: Some(AwsCloud {
                    machine_image: None,
                    networks: AwsNetworks {
                        vpc: Vpc {
                            cidr: Some("10.250.0.0/16".to_string()),
                            id: None,
                        },
                        ..Default::default()
                    },
                    workers,
                    zones: vec!["eu-central-1a".to_string()],
                    extra: BTreeMap::new(),
                }),
                extra: BTreeMap::new(),
            },
            kubernetes: KubernetesConfig {
                version: "1.12.1".to_string(),
                extra: BTreeMap::new(),
            },
            extra: BTreeMap::new(),
        },
    );
    shoot.metadata.namespace = Some("garden-ci".to_string());
    shoot.status = last_operation.map(|(type_, state)| ShootStatus {
        last_operation: Some(LastOperation {
            type_: type_.to_string(),
            state: state.to_string(),
            description: format!("{type_} {state}"),
            progress: 100,
        }),
        extra: BTreeMap::new(),
    });
    shoot
}

pub fn cloud_profile() -> CloudProfile {
    let named = |name: &str| NamedEntry {
        name: name.to_string(),
        extra: BTreeMap::new(),
    };
    CloudProfile::new(
        "aws",
        CloudProfileSpec {
            aws: Some(AwsProfile {
                constraints: AwsConstraints {
                    kubernetes: KubernetesConstraints {
                        versions: vec![
                            "1.11.10".to_string(),
                            "1.12.1".to_string(),
                            "1.9.11".to_string(),
                        ],
                    },
                    machine_images: vec![named("coreos")],
                    machine_types: vec![named("m5.large"), named("m5.xlarge")],
                    volume_types: vec![named("gp2"), named("io1")],
                    zones: vec![
                        ProfileZone {
                            region: "us-east-1".to_string(),
                            names: vec!["us-east-1a".to_string()],
                        },
                        ProfileZone {
                            region: "eu-central-1".to_string(),
                            names: vec!["eu-central-1a".to_string(), "eu-central-1b".to_string()],
                        },
                    ],
                },
            }),
            extra: BTreeMap::new(),
        },
    )
}

pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("7".to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Backend credential secret as generated for a Shoot
pub fn credentials_secret() -> Secret {
    secret(
        "garden-ci",
        "build-42.kubeconfig",
        &[
            ("kubeconfig", "apiVersion: v1"),
            ("kubecfg.key", "key"),
            ("ca.crt", "ca"),
            ("kubecfg.crt", "crt"),
            ("username", "admin"),
            ("password", "hunter2"),
        ],
    )
}

pub fn bundle(store: MockObjectStore, shoots: MockShootService) -> ClientBundle {
    ClientBundle {
        store: Arc::new(store),
        shoots: Arc::new(shoots),
    }
}

/// Accessor that always hands out the given bundle
pub fn accessor(bundle: ClientBundle) -> MockClientAccessor {
    let mut accessor = MockClientAccessor::new();
    accessor
        .expect_get()
        .returning(move |_| Some(bundle.clone()));
    accessor.expect_forget().returning(|_| ());
    accessor
}
