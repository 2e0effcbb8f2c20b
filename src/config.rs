//! Environment Configuration
//!
//! All process roles read their settings from the environment: the public
//! port and mode flag come from the operator, the worker port and index are
//! injected by the primary at fork time. Validation happens before any
//! socket is opened so configuration mistakes abort startup cleanly.

use anyhow::{Context, Result, bail};

/// Public listener port (required, 1-65535).
pub const ENV_PORT: &str = "RECORD_API_PORT";
/// Set to `multi` to enable the primary/worker topology.
pub const ENV_MODE: &str = "MODE";
/// Assigned HTTP port of a forked worker. Its presence selects worker role.
pub const ENV_WORKER_PORT: &str = "WORKER_PORT";
/// 1-based index of a forked worker.
pub const ENV_WORKER_INDEX: &str = "WORKER_INDEX";

const MODE_MULTI: &str = "multi";

#[derive(Debug, Clone)]
pub struct Config {
    pub public_port: u16,
    pub multi: bool,
    pub worker: Option<WorkerConfig>,
}

/// Settings handed to one forked worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub port: u16,
    pub index: usize,
}

/// What this process is supposed to be.
#[derive(Debug, Clone, Copy)]
pub enum Role {
    /// One process doing everything: HTTP, dispatch, and storage.
    Single,
    /// Forks the pool, owns the store, runs the balancer.
    Primary,
    /// Stateless HTTP front delegating every operation to the primary.
    Worker(WorkerConfig),
}

impl Config {
    /// Reads and validates the environment.
    pub fn from_env() -> Result<Self> {
        let public_port = parse_port(std::env::var(ENV_PORT).ok().as_deref())
            .with_context(|| format!("{ENV_PORT} must hold the public listener port"))?;

        let multi = std::env::var(ENV_MODE)
            .map(|mode| mode == MODE_MULTI)
            .unwrap_or(false);

        let worker = match std::env::var(ENV_WORKER_PORT) {
            Ok(raw) => {
                let port = parse_port(Some(&raw))
                    .with_context(|| format!("{ENV_WORKER_PORT} is set but invalid"))?;
                let index = std::env::var(ENV_WORKER_INDEX)
                    .ok()
                    .and_then(|raw| raw.trim().parse::<usize>().ok())
                    .unwrap_or(1);
                Some(WorkerConfig { port, index })
            }
            Err(_) => None,
        };

        Ok(Self {
            public_port,
            multi,
            worker,
        })
    }

    pub fn role(&self) -> Role {
        match (&self.worker, self.multi) {
            (Some(worker), _) => Role::Worker(*worker),
            (None, true) => Role::Primary,
            (None, false) => Role::Single,
        }
    }
}

fn parse_port(raw: Option<&str>) -> Result<u16> {
    let raw = raw.context("port is not set")?;
    let port: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("port {raw:?} is not a number"))?;
    if !(1..=65535).contains(&port) {
        bail!("port must be between 1 and 65535, got {port}");
    }
    Ok(port as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_port() {
        assert_eq!(parse_port(Some("4000")).unwrap(), 4000);
        assert_eq!(parse_port(Some(" 65535 ")).unwrap(), 65535);
    }

    #[test]
    fn rejects_missing_port() {
        assert!(parse_port(None).is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse_port(Some("fourthousand")).is_err());
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(parse_port(Some("0")).is_err());
        assert!(parse_port(Some("70000")).is_err());
        assert!(parse_port(Some("-1")).is_err());
    }
}
