//! The host's own IPv4 address and prefix, read from its network
//! interfaces.
//!
//! Used as the default scan target and as the address marked `primary` in
//! the graph when none is configured.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::IpNetwork;

use crate::error::{DiscoverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNetwork {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl LocalNetwork {
    /// The enclosing subnet as `a.b.c.d/n`, host bits cleared.
    pub fn cidr(&self) -> String {
        match Ipv4Net::new(self.address, self.prefix_len) {
            Ok(net) => net.trunc().to_string(),
            Err(_) => format!("{}/32", self.address),
        }
    }
}

/// Detect the first usable IPv4 address on an up, non-loopback interface.
pub fn detect() -> Result<LocalNetwork> {
    let interfaces = datalink::interfaces();
    tracing::debug!(interfaces = interfaces.len(), "Enumerated network interfaces");

    let candidates: Vec<(Ipv4Addr, u8)> = interfaces
        .iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .flat_map(ipv4_networks)
        .collect();

    let local = select(&candidates)?;
    tracing::info!(address = %local.address, prefix_len = local.prefix_len, "Detected local network");
    Ok(local)
}

fn ipv4_networks(iface: &NetworkInterface) -> impl Iterator<Item = (Ipv4Addr, u8)> + '_ {
    iface.ips.iter().filter_map(|ip| match ip {
        IpNetwork::V4(net) => Some((net.ip(), net.prefix())),
        IpNetwork::V6(_) => None,
    })
}

/// Pick the first routable candidate. Loopback and unspecified addresses
/// are skipped; a link-local (169.254/16) address only means the host has
/// no network, so it is reported rather than used.
fn select(candidates: &[(Ipv4Addr, u8)]) -> Result<LocalNetwork> {
    let usable = candidates.iter().find(|(addr, _)| {
        !addr.is_loopback() && !addr.is_unspecified() && !addr.is_link_local()
    });
    if let Some(&(address, prefix_len)) = usable {
        return Ok(LocalNetwork {
            address,
            prefix_len,
        });
    }

    match candidates.iter().find(|(addr, _)| addr.is_link_local()) {
        Some((addr, _)) => Err(DiscoverError::NoLocalNetwork(format!(
            "only the self-assigned address {addr} is configured; connect to a network"
        ))),
        None => Err(DiscoverError::NoLocalNetwork(
            "no IPv4 address on any active interface".to_string(),
        )),
    }
}
