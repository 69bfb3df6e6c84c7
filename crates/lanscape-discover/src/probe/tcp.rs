//! TCP connect probes.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{is_resource_exhaustion, LivenessProbe, PortProbe, ProbeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connect {
    Accepted,
    Refused,
    Silent,
}

async fn connect(addr: Ipv4Addr, port: u16, timeout: Duration) -> Result<Connect, ProbeError> {
    let socket = SocketAddr::new(addr.into(), port);
    match tokio::time::timeout(timeout, TcpStream::connect(socket)).await {
        Ok(Ok(_stream)) => Ok(Connect::Accepted),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => Ok(Connect::Refused),
        Ok(Err(e)) if is_resource_exhaustion(&e) => Err(ProbeError::ResourceExhausted(format!(
            "connecting to {socket}: {e}"
        ))),
        Ok(Err(e)) => {
            tracing::trace!(target_addr = %socket, error = %e, "TCP connect failed");
            Ok(Connect::Silent)
        }
        Err(_) => Ok(Connect::Silent),
    }
}

/// Full TCP handshake; the connection is dropped immediately after.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortProbe;

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn check_port(
        &self,
        addr: Ipv4Addr,
        port: u16,
        timeout: Duration,
    ) -> Result<bool, ProbeError> {
        Ok(connect(addr, port, timeout).await? == Connect::Accepted)
    }
}

/// Treats a host as live if any of a few TCP ports accepts or actively
/// refuses a connection. A refusal still proves something is there.
///
/// The ports are tried in order, each with an equal share of the timeout.
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    ports: Vec<u16>,
}

impl TcpConnectProbe {
    pub fn new(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl LivenessProbe for TcpConnectProbe {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn check_live(&self, addr: Ipv4Addr, timeout: Duration) -> Result<bool, ProbeError> {
        if self.ports.is_empty() {
            return Ok(false);
        }
        let share = timeout / self.ports.len() as u32;
        for &port in &self.ports {
            if connect(addr, port, share).await? != Connect::Silent {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
