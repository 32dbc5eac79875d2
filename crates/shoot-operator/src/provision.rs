//! Shoot provisioning
//!
//! Builds the desired Shoot from a ShootCluster and the configured CloudProfile
//! and asks the backend to create it. Creation is attempted on every sync; an
//! "already exists" answer means an earlier attempt went through and is
//! reported as [`Provisioned::AlreadyExists`] rather than an error.

use std::collections::BTreeMap;
use std::time::Instant;

use kube::ResourceExt;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::client::{ApiError, ShootService};
use crate::config::ProvisioningConfig;
use crate::shoot::{
    AwsCloud, AwsConstraints, AwsNetworks, Cloud, CloudProfile, KubernetesConfig, LocalReference,
    MachineImage, Shoot, ShootSpec, Vpc, Worker,
};
use crate::shootcluster::ShootCluster;
use crate::validation::{validate_spec, ValidationError};

/// Name of the single worker pool the operator manages
pub const WORKER_POOL_NAME: &str = "worker-1";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Invalid ShootCluster spec: {0}")]
    InvalidSpec(#[from] ValidationError),
    #[error("CloudProfile {profile} cannot host the shoot: {reason}")]
    UnusableProfile { profile: String, reason: String },
    #[error("Shoot API error: {0}")]
    Api(#[from] ApiError),
}

/// Outcome of a create attempt
#[derive(Debug)]
pub enum Provisioned {
    Created(Box<Shoot>),
    AlreadyExists,
}

/// Volume size in the unit suffix format the backend expects
pub fn volume_size(disk_size: i32) -> String {
    format!("{}Gi", disk_size)
}

/// Pick the newest version by comparing dotted numeric components
fn latest_version(versions: &[String]) -> Option<&String> {
    fn key(v: &str) -> Vec<u64> {
        v.split('.').map(|p| p.parse().unwrap_or(0)).collect()
    }
    versions.iter().max_by(|a, b| key(a).cmp(&key(b)))
}

fn pick<'a>(
    configured: Option<&'a String>,
    offered: &'a [crate::shoot::NamedEntry],
    what: &str,
    profile: &str,
) -> Result<String, ProvisionError> {
    configured
        .or_else(|| offered.first().map(|e| &e.name))
        .cloned()
        .ok_or_else(|| ProvisionError::UnusableProfile {
            profile: profile.to_string(),
            reason: format!("no {what} offered"),
        })
}

/// Build the desired Shoot for a ShootCluster
pub fn build_shoot(
    shoot_cluster: &ShootCluster,
    profile: &CloudProfile,
    config: &ProvisioningConfig,
) -> Result<Shoot, ProvisionError> {
    let spec = &shoot_cluster.spec;
    validate_spec(spec)?;

    let profile_name = profile.name_any();
    let constraints: &AwsConstraints = profile
        .spec
        .aws
        .as_ref()
        .map(|aws| &aws.constraints)
        .ok_or_else(|| ProvisionError::UnusableProfile {
            profile: profile_name.clone(),
            reason: "no AWS constraints".to_string(),
        })?;

    let kubernetes_version = config
        .kubernetes_version
        .as_ref()
        .or_else(|| latest_version(&constraints.kubernetes.versions))
        .cloned()
        .ok_or_else(|| ProvisionError::UnusableProfile {
            profile: profile_name.clone(),
            reason: "no Kubernetes version offered".to_string(),
        })?;

    let machine_type = pick(
        config.machine_type.as_ref(),
        &constraints.machine_types,
        "machine type",
        &profile_name,
    )?;
    let volume_type = pick(
        config.volume_type.as_ref(),
        &constraints.volume_types,
        "volume type",
        &profile_name,
    )?;
    let machine_image = config
        .machine_image
        .as_ref()
        .or_else(|| constraints.machine_images.first().map(|i| &i.name))
        .map(|name| MachineImage {
            name: name.clone(),
            ami: None,
        });

    let zone = constraints
        .zones
        .iter()
        .find(|z| z.region == config.region)
        .and_then(|z| z.names.first())
        .cloned()
        .ok_or_else(|| ProvisionError::UnusableProfile {
            profile: profile_name.clone(),
            reason: format!("no zone in region {}", config.region),
        })?;

    let networks = &config.networks;
    let mut shoot = Shoot::new(
        &spec.shoot_name,
        ShootSpec {
            cloud: Cloud {
                profile: profile_name,
                region: config.region.clone(),
                secret_binding_ref: LocalReference {
                    name: config.secret_binding_name.clone(),
                },
                aws: Some(AwsCloud {
                    machine_image,
                    networks: AwsNetworks {
                        vpc: Vpc {
                            cidr: Some(networks.vpc_cidr.clone()),
                            id: None,
                        },
                        nodes: networks.nodes.clone(),
                        pods: networks.pods.clone(),
                        services: networks.services.clone(),
                        internal: vec![networks.internal.clone()],
                        public: vec![networks.public.clone()],
                        workers: vec![networks.workers.clone()],
                    },
                    workers: vec![Worker {
                        name: WORKER_POOL_NAME.to_string(),
                        machine_type,
                        auto_scaler_min: spec.min_nodes,
                        auto_scaler_max: spec.max_nodes,
                        volume_size: volume_size(spec.disk_size),
                        volume_type,
                        extra: BTreeMap::new(),
                    }],
                    zones: vec![zone],
                    extra: BTreeMap::new(),
                }),
                extra: BTreeMap::new(),
            },
            kubernetes: KubernetesConfig {
                version: kubernetes_version,
                extra: BTreeMap::new(),
            },
            extra: BTreeMap::new(),
        },
    );
    shoot.metadata.namespace = Some(spec.gardener_namespace.clone());

    Ok(shoot)
}

/// Ask the backend to create the Shoot for a ShootCluster
#[instrument(skip_all, fields(shoot = %shoot_cluster.spec.shoot_name, namespace = %shoot_cluster.spec.gardener_namespace))]
pub async fn create_shoot(
    shoots: &dyn ShootService,
    shoot_cluster: &ShootCluster,
    config: &ProvisioningConfig,
) -> Result<Provisioned, ProvisionError> {
    let started = Instant::now();

    let profile = shoots.get_cloud_profile(&config.cloud_profile).await?;
    let desired = build_shoot(shoot_cluster, &profile, config)?;

    match shoots.create_shoot(&desired).await {
        Ok(created) => {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Created new shoot"
            );
            Ok(Provisioned::Created(Box::new(created)))
        }
        Err(e) if e.is_already_exists() => {
            debug!("Shoot already exists");
            Ok(Provisioned::AlreadyExists)
        }
        Err(e) => {
            warn!(error = %e, "Backend did not create the shoot");
            Err(e.into())
        }
    }
}
