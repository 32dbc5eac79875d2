//! Lease-based leader election
//!
//! Only one replica reconciles ShootClusters at a time. Standby replicas block
//! in [`LeaderElection::acquire`]; the leader keeps renewing the Lease and
//! exits the process once it can no longer prove leadership.

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use k8s_openapi::api::coordination::v1::Lease;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

const MAX_RENEWAL_FAILURES: u32 = 3;

const DEFAULT_LEASE_SECS: u64 = 15;
const DEFAULT_RENEW_SECS: u64 = 5;

/// Where the Lease lives and who claims it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSettings {
    pub lease_name: String,
    pub namespace: String,
    pub holder_id: String,
    pub lease_ttl: Duration,
    pub renew_every: Duration,
}

impl LeaseSettings {
    /// `None` unless `LEADER_ELECTION_ENABLED=true`.
    ///
    /// The Lease is named by `LEADER_ELECTION_LEASE_NAME` and lives in
    /// `POD_NAMESPACE`; `POD_NAME` is the holder identity. Timings come from
    /// `LEADER_ELECTION_LEASE_DURATION` and `LEADER_ELECTION_RENEW_INTERVAL`
    /// (seconds).
    pub fn from_env() -> Result<Option<Self>> {
        let enabled = std::env::var("LEADER_ELECTION_ENABLED")
            .is_ok_and(|v| v.eq_ignore_ascii_case("true"));
        if !enabled {
            return Ok(None);
        }

        let non_empty = |var: &str| -> Result<String> {
            let value = std::env::var(var)
                .with_context(|| format!("{var} required when leader election is enabled"))?;
            ensure!(!value.is_empty(), "{var} cannot be empty");
            Ok(value)
        };

        let settings = Self {
            lease_name: non_empty("LEADER_ELECTION_LEASE_NAME")?,
            namespace: non_empty("POD_NAMESPACE")?,
            holder_id: non_empty("POD_NAME")?,
            lease_ttl: secs_or("LEADER_ELECTION_LEASE_DURATION", DEFAULT_LEASE_SECS),
            renew_every: secs_or("LEADER_ELECTION_RENEW_INTERVAL", DEFAULT_RENEW_SECS),
        };
        ensure!(
            settings.renew_every < settings.lease_ttl,
            "renew interval {:?} must be shorter than lease duration {:?}",
            settings.renew_every,
            settings.lease_ttl
        );
        Ok(Some(settings))
    }
}

fn secs_or(var: &str, default: u64) -> Duration {
    let secs = match std::env::var(var).map(|v| v.parse::<u64>()) {
        Ok(Ok(secs)) => secs,
        Ok(Err(e)) => {
            warn!(env_var = var, error = %e, default, "Ignoring unparsable duration");
            default
        }
        Err(_) => default,
    };
    Duration::from_secs(secs)
}

fn holder_of(lease: Option<&Lease>) -> &str {
    lease
        .and_then(|l| l.spec.as_ref())
        .and_then(|s| s.holder_identity.as_deref())
        .unwrap_or("unknown")
}

/// Outcome of one acquire-or-renew round trip
enum Claim {
    Held,
    HeldBy(String),
    Failed(String),
}

pub struct LeaderElection {
    lock: LeaseLock,
    renew_every: Duration,
}

impl LeaderElection {
    pub fn new(client: Client, settings: &LeaseSettings) -> Self {
        let lock = LeaseLock::new(
            client,
            &settings.namespace,
            LeaseLockParams {
                holder_id: settings.holder_id.clone(),
                lease_name: settings.lease_name.clone(),
                lease_ttl: settings.lease_ttl,
            },
        );
        Self {
            lock,
            renew_every: settings.renew_every,
        }
    }

    async fn claim(&self) -> Claim {
        match self.lock.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => Claim::Held,
            Ok(result) => Claim::HeldBy(holder_of(result.lease.as_ref()).to_string()),
            Err(e) => Claim::Failed(e.to_string()),
        }
    }

    /// Wait until this replica holds the Lease
    pub async fn acquire(&self) {
        loop {
            match self.claim().await {
                Claim::Held => {
                    info!("Leadership acquired");
                    return;
                }
                Claim::HeldBy(holder) => info!(holder = %holder, "Standing by"),
                Claim::Failed(e) => warn!(error = %e, "Lease check failed"),
            }
            tokio::time::sleep(self.renew_every).await;
        }
    }

    /// Renew in the background; exits the process when leadership is gone
    pub fn spawn_renewal_task(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                tokio::time::sleep(self.renew_every).await;
                match self.claim().await {
                    Claim::Held => {
                        failures = 0;
                        trace!("Lease renewed");
                    }
                    Claim::HeldBy(holder) => {
                        error!(holder = %holder, "Leadership taken over, exiting");
                        std::process::exit(1);
                    }
                    Claim::Failed(e) => {
                        failures += 1;
                        if failures >= MAX_RENEWAL_FAILURES {
                            error!(error = %e, failures, "Cannot renew lease, exiting");
                            std::process::exit(1);
                        }
                        warn!(error = %e, failures, "Lease renewal failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_env(vars: &[(&str, &str)], check: impl FnOnce()) {
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        check();
        for (k, _) in vars {
            std::env::remove_var(k);
        }
    }

    const BASE: [(&str, &str); 4] = [
        ("LEADER_ELECTION_ENABLED", "true"),
        ("LEADER_ELECTION_LEASE_NAME", "shoot-operator-leader"),
        ("POD_NAMESPACE", "shoot-operator-system"),
        ("POD_NAME", "shoot-operator-0"),
    ];

    #[test]
    #[serial]
    fn test_disabled_unless_requested() {
        with_env(&[("LEADER_ELECTION_ENABLED", "no")], || {
            assert_eq!(LeaseSettings::from_env().unwrap(), None);
        });
    }

    #[test]
    #[serial]
    fn test_missing_pod_name_is_reported() {
        with_env(&BASE[..3], || {
            let err = LeaseSettings::from_env().unwrap_err();
            assert!(err.to_string().contains("POD_NAME"));
        });
    }

    #[test]
    #[serial]
    fn test_settings_with_defaults_and_overrides() {
        with_env(&BASE, || {
            let settings = LeaseSettings::from_env().unwrap().unwrap();
            assert_eq!(settings.holder_id, "shoot-operator-0");
            assert_eq!(settings.lease_ttl, Duration::from_secs(15));
            assert_eq!(settings.renew_every, Duration::from_secs(5));
        });

        let mut vars = BASE.to_vec();
        vars.push(("LEADER_ELECTION_LEASE_DURATION", "30"));
        vars.push(("LEADER_ELECTION_RENEW_INTERVAL", "soon"));
        with_env(&vars, || {
            let settings = LeaseSettings::from_env().unwrap().unwrap();
            assert_eq!(settings.lease_ttl, Duration::from_secs(30));
            assert_eq!(settings.renew_every, Duration::from_secs(5));
        });
    }

    #[test]
    #[serial]
    fn test_renew_must_be_shorter_than_lease() {
        let mut vars = BASE.to_vec();
        vars.push(("LEADER_ELECTION_LEASE_DURATION", "10"));
        vars.push(("LEADER_ELECTION_RENEW_INTERVAL", "10"));
        with_env(&vars, || {
            let err = LeaseSettings::from_env().unwrap_err();
            assert!(err.to_string().contains("renew interval"));
        });
    }
}
