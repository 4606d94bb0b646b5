//! Worker lifecycle: `Registering -> AwaitingPhoneBook -> Ready`.
//!
//! A worker announces its own reachable address, then blocks (on the
//! socket, not busy-waiting) until the registry's phone book arrives. The
//! wait is bounded; a deployment where the registry never answers should
//! fail loudly rather than hang forever.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use eflex_core::UnitId;

use crate::error::CoordError;
use crate::messages::{Message, PhoneBookEntry};

const ENV_REGISTRY_ADDR: &str = "EFLEX_REGISTRY_ADDR";
const ENV_WORKER_NAME: &str = "EFLEX_WORKER_NAME";
const ENV_WORKER_UNITS: &str = "EFLEX_WORKER_UNITS";
const ENV_WORKER_PERIODS: &str = "EFLEX_WORKER_PERIODS";

const DEFAULT_PHONE_BOOK_WAIT: Duration = Duration::from_secs(60);

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Registering,
    AwaitingPhoneBook,
    Ready,
}

/// Deployment-supplied worker scope.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Registry `host:port`.
    pub registry_addr: String,
    /// This worker's advertised name.
    pub name: String,
    /// Units whose per-unit blocks this worker executes.
    pub units: Vec<UnitId>,
    /// Assigned 1-based periods for the slack and price blocks.
    pub periods: Vec<usize>,
    /// Bound on the phone-book wait.
    pub phone_book_wait: Duration,
}

impl WorkerConfig {
    /// Read the worker scope from the `EFLEX_*` environment variables.
    ///
    /// A missing variable is fatal: a worker must never run with an
    /// undefined unit or period assignment.
    pub fn from_env() -> Result<Self, CoordError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, CoordError> {
        let required = |var: &'static str| {
            lookup(var).ok_or(CoordError::ConfigurationMissing { var })
        };
        let registry_addr = required(ENV_REGISTRY_ADDR)?;
        let name = required(ENV_WORKER_NAME)?;
        let units = parse_index_list(ENV_WORKER_UNITS, &required(ENV_WORKER_UNITS)?)?
            .into_iter()
            .map(UnitId::new)
            .collect();
        let periods = parse_index_list(ENV_WORKER_PERIODS, &required(ENV_WORKER_PERIODS)?)?;
        Ok(WorkerConfig {
            registry_addr,
            name,
            units,
            periods,
            phone_book_wait: DEFAULT_PHONE_BOOK_WAIT,
        })
    }
}

/// Parse `"0,2,5"` or `"1-4,7"` into indices.
fn parse_index_list(var: &'static str, raw: &str) -> Result<Vec<usize>, CoordError> {
    let invalid = |reason: String| CoordError::ConfigurationInvalid { var, reason };
    let mut indices = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: usize = lo.parse().map_err(|_| invalid(format!("bad range {part:?}")))?;
            let hi: usize = hi.parse().map_err(|_| invalid(format!("bad range {part:?}")))?;
            if lo > hi {
                return Err(invalid(format!("empty range {part:?}")));
            }
            indices.extend(lo..=hi);
        } else {
            indices.push(
                part.parse()
                    .map_err(|_| invalid(format!("bad index {part:?}")))?,
            );
        }
    }
    if indices.is_empty() {
        return Err(invalid("empty assignment".to_string()));
    }
    Ok(indices)
}

/// A registered (or registering) worker endpoint.
pub struct Worker {
    config: WorkerConfig,
    state: WorkerState,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Worker {
            config,
            state: WorkerState::Registering,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the handshake: register with the registry, wait for the phone
    /// book, enter `Ready`. Returns the received phone book.
    pub async fn join(&mut self, advertised_port: u16) -> Result<Vec<PhoneBookEntry>, CoordError> {
        let stream = TcpStream::connect(&self.config.registry_addr).await?;
        let local_host = stream.local_addr()?.ip().to_string();
        let mut reader = BufReader::new(stream);

        let register = Message::Register {
            host: local_host,
            port: advertised_port,
        };
        reader.get_mut().write_all(register.encode().as_bytes()).await?;
        reader.get_mut().flush().await?;
        self.state = WorkerState::AwaitingPhoneBook;

        let mut line = String::new();
        let read = timeout(self.config.phone_book_wait, reader.read_line(&mut line))
            .await
            .map_err(|_| CoordError::PhoneBookTimeout {
                seconds: self.config.phone_book_wait.as_secs(),
            })??;
        if read == 0 {
            return Err(CoordError::ConnectionClosed {
                phase: "phone book",
            });
        }

        match Message::parse(&line)? {
            Message::PhoneBook { entries } => {
                self.state = WorkerState::Ready;
                info!(
                    name = self.config.name,
                    peers = entries.len(),
                    "worker ready"
                );
                Ok(entries)
            }
            other => Err(CoordError::MalformedMessage(format!(
                "expected phoneBook, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(entries: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        entries.iter().map(|&(k, v)| (k, v.to_string())).collect()
    }

    #[test]
    fn config_requires_every_variable() {
        let mut vars = env(&[
            (ENV_REGISTRY_ADDR, "127.0.0.1:9000"),
            (ENV_WORKER_NAME, "w0"),
            (ENV_WORKER_UNITS, "0,1"),
            (ENV_WORKER_PERIODS, "1-4"),
        ]);
        assert!(WorkerConfig::from_lookup(|v| vars.get(v).cloned()).is_ok());

        vars.remove(ENV_WORKER_PERIODS);
        let err = WorkerConfig::from_lookup(|v| vars.get(v).cloned()).unwrap_err();
        assert!(matches!(
            err,
            CoordError::ConfigurationMissing {
                var: ENV_WORKER_PERIODS
            }
        ));
    }

    #[test]
    fn index_lists_support_ranges() {
        assert_eq!(parse_index_list("X", "0,2,5").unwrap(), vec![0, 2, 5]);
        assert_eq!(parse_index_list("X", "1-4,7").unwrap(), vec![1, 2, 3, 4, 7]);
        assert!(parse_index_list("X", "4-1").is_err());
        assert!(parse_index_list("X", "").is_err());
        assert!(parse_index_list("X", "abc").is_err());
    }
}
