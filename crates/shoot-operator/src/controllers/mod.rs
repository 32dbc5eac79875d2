//! Kubernetes controllers for watched resources

pub mod retry;
pub mod shootcluster;

use std::sync::Arc;

use crate::config::ShootOperatorConfigSpec;
use crate::operator::ShootOperator;

use retry::RetryTracker;

/// Shared state for the controllers
pub struct ControllerContext {
    pub operator: Arc<ShootOperator>,
    /// Operator configuration
    pub config: Arc<ShootOperatorConfigSpec>,
    /// Failed attempts per resource, drives backoff
    pub retry_tracker: Arc<RetryTracker>,
}
