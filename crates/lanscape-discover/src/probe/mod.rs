//! Reachability probes.
//!
//! A [`LivenessProbe`] answers "does anything respond at this address?" and a
//! [`PortProbe`] answers "does this TCP port accept a connection?". Both
//! return `Ok(false)` for silence, refusal, or timeout. `Err` is reserved for
//! conditions that make the rest of the pass meaningless: the mechanism is
//! missing entirely, or the process has run out of sockets.

pub mod icmp;
pub mod ping;
pub mod tcp;

use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::DiscoverError;

pub use icmp::IcmpProbe;
pub use ping::PingCommandProbe;
pub use tcp::{TcpConnectProbe, TcpPortProbe};

/// A failure that aborts the whole pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe mechanism unavailable: {0}")]
    Unavailable(String),

    #[error("out of sockets or file descriptors: {0}")]
    ResourceExhausted(String),
}

impl From<ProbeError> for DiscoverError {
    fn from(e: ProbeError) -> Self {
        match e {
            ProbeError::Unavailable(msg) => Self::ProbeUnavailable(msg),
            ProbeError::ResourceExhausted(msg) => Self::ResourceExhausted(msg),
        }
    }
}

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// `Ok(true)` if `addr` answered within `timeout`.
    async fn check_live(&self, addr: Ipv4Addr, timeout: Duration) -> Result<bool, ProbeError>;
}

#[async_trait]
pub trait PortProbe: Send + Sync {
    /// `Ok(true)` if a TCP connection to `addr:port` completed within `timeout`.
    async fn check_port(
        &self,
        addr: Ipv4Addr,
        port: u16,
        timeout: Duration,
    ) -> Result<bool, ProbeError>;
}

#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(all(unix, not(target_os = "linux")))]
const ENOBUFS: i32 = 55;

/// Whether an I/O error means the process ran out of descriptors or buffers,
/// as opposed to the remote end being unreachable.
pub fn is_resource_exhaustion(e: &io::Error) -> bool {
    let Some(code) = e.raw_os_error() else {
        return false;
    };

    #[cfg(unix)]
    {
        // ENFILE, EMFILE
        matches!(code, 23 | 24) || code == ENOBUFS
    }
    #[cfg(windows)]
    {
        // WSAEMFILE, WSAENOBUFS
        matches!(code, 10024 | 10055)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_errors_map_to_scan_errors() {
        let e: DiscoverError = ProbeError::Unavailable("no raw socket".into()).into();
        assert!(matches!(e, DiscoverError::ProbeUnavailable(ref m) if m == "no raw socket"));

        let e: DiscoverError = ProbeError::ResourceExhausted("EMFILE".into()).into();
        assert!(matches!(e, DiscoverError::ResourceExhausted(_)));
        assert!(!e.is_client_error());
    }

    #[cfg(unix)]
    #[test]
    fn descriptor_exhaustion_is_recognised() {
        assert!(is_resource_exhaustion(&io::Error::from_raw_os_error(24)));
        assert!(is_resource_exhaustion(&io::Error::from_raw_os_error(23)));
        assert!(is_resource_exhaustion(&io::Error::from_raw_os_error(ENOBUFS)));
        // ECONNREFUSED
        assert!(!is_resource_exhaustion(&io::Error::from_raw_os_error(111)));
        assert!(!is_resource_exhaustion(&io::Error::new(io::ErrorKind::TimedOut, "slow")));
    }
}
