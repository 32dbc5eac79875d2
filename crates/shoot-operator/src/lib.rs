//! shoot-operator: Kubernetes controller provisioning Shoot clusters for ShootCluster resources

pub mod cache;
pub mod client;
pub mod config;
pub mod controllers;
pub mod credentials;
pub mod deletion;
pub mod drift;
pub mod health;
pub mod leader;
pub mod operator;
pub mod provision;
pub mod shoot;
pub mod shootcluster;
pub mod status;
pub mod validation;

#[cfg(test)]
mod test_utils;

pub use config::ShootOperatorConfig;
pub use shootcluster::ShootCluster;
