//! Backoff policy for failed reconciliations
//!
//! Transient failures requeue with exponential backoff per ShootCluster UID.
//! Permanent failures wait for the resource to change.

use std::collections::HashMap;
use std::time::Duration;

use kube::runtime::controller::Action;
use parking_lot::Mutex;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 10;

const BASE_DELAY_SECS: u64 = 5;

/// One hour
const MAX_DELAY_SECS: u64 = 3600;

/// Failed attempts per resource UID
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt and return the attempt count
    pub fn increment(&self, uid: &str) -> u32 {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(uid.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget a resource's failures after a successful reconcile
    pub fn reset(&self, uid: &str) {
        self.attempts.lock().remove(uid);
    }

    pub fn get(&self, uid: &str) -> u32 {
        self.attempts.lock().get(uid).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend or API server hiccups, retried with backoff
    Transient,
    /// Needs a change to the ShootCluster before retrying makes sense
    Permanent,
}

/// Delay before the given attempt: 5s, 10s, 20s, ... capped at one hour
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = BASE_DELAY_SECS.saturating_mul(2u64.pow(exponent));
    Duration::from_secs(delay.min(MAX_DELAY_SECS))
}

pub fn compute_backoff(attempt: u32, kind: ErrorKind) -> Action {
    match kind {
        ErrorKind::Transient if attempt >= MAX_RETRIES => {
            warn!(
                attempt,
                max_retries = MAX_RETRIES,
                "Max retries exceeded, waiting for resource change"
            );
            Action::await_change()
        }
        ErrorKind::Transient => {
            let delay = backoff_delay(attempt);
            debug!(
                attempt,
                delay_secs = delay.as_secs(),
                "Scheduling retry with exponential backoff"
            );
            Action::requeue(delay)
        }
        ErrorKind::Permanent => {
            warn!("Permanent error, waiting for resource change");
            Action::await_change()
        }
    }
}
