//! Error types for the lanscape-discover crate.

use thiserror::Error;

use crate::persist::PersistError;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid IPv4 range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },

    #[error("Subnet {cidr} has {hosts} usable hosts, above the limit of {limit}")]
    SubnetTooLarge { cidr: String, hosts: u64, limit: u64 },

    #[error("Liveness probe unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("Probe resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Inconsistent scan result: {0}")]
    InconsistentResult(String),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Probe task failed: {0}")]
    TaskJoin(String),

    #[error("No local network: {0}")]
    NoLocalNetwork(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// Whether the error was caused by the caller's input rather than by
    /// the scan itself failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRange { .. } | Self::SubnetTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
