//! ICMP echo liveness probe on a shared socket.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};

use super::{is_resource_exhaustion, LivenessProbe, ProbeError};

const PAYLOAD: [u8; 56] = [0; 56];

/// Sends one echo request per address over a single ICMP socket.
///
/// Opening the socket needs either raw-socket privileges or an unprivileged
/// ICMP datagram socket (`net.ipv4.ping_group_range` on Linux). Without
/// either, [`IcmpProbe::new`] fails with [`ProbeError::Unavailable`].
pub struct IcmpProbe {
    client: Client,
}

impl IcmpProbe {
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Result<Self, ProbeError> {
        let config = Config::builder().kind(ICMP::V4).build();
        let client = Client::new(&config).map_err(|e| socket_error(&e))?;
        Ok(Self { client })
    }
}

fn socket_error(e: &io::Error) -> ProbeError {
    if is_resource_exhaustion(e) {
        ProbeError::ResourceExhausted(format!("opening ICMP socket: {e}"))
    } else {
        ProbeError::Unavailable(format!("cannot open ICMP socket: {e}"))
    }
}

#[async_trait]
impl LivenessProbe for IcmpProbe {
    fn name(&self) -> &'static str {
        "icmp"
    }

    async fn check_live(&self, addr: Ipv4Addr, timeout: Duration) -> Result<bool, ProbeError> {
        let mut pinger = self
            .client
            .pinger(IpAddr::V4(addr), PingIdentifier(rand::random()))
            .await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok(_) => Ok(true),
            Err(SurgeError::Timeout { .. }) => Ok(false),
            Err(SurgeError::IOError(e)) if is_resource_exhaustion(&e) => {
                Err(ProbeError::ResourceExhausted(format!("ICMP send to {addr}: {e}")))
            }
            Err(SurgeError::IOError(e)) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(ProbeError::Unavailable(format!("ICMP send to {addr}: {e}")))
            }
            Err(e) => {
                tracing::debug!(address = %addr, error = %e, "ICMP echo failed");
                Ok(false)
            }
        }
    }
}
