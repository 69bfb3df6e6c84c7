//! Address enumeration: expand a CIDR or bare IPv4 address into the
//! ordered list of usable host addresses.
//!
//! Pure functions, no I/O. Malformed input fails here, before any probe
//! is issued.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use lanscape_core::{Address, Subnet};

use crate::error::{DiscoverError, Result};

/// A parsed subnet and its usable addresses, all with status `Unknown`.
#[derive(Debug, Clone)]
pub struct Enumeration {
    pub subnet: Subnet,
    /// Ascending numeric order.
    pub addresses: Vec<Address>,
}

impl Enumeration {
    pub fn values(&self) -> Vec<Ipv4Addr> {
        self.addresses.iter().map(|a| a.value).collect()
    }
}

/// Parse `a.b.c.d/n` or a bare `a.b.c.d` (treated as `/32`) without
/// materialising the address list. Host bits are cleared.
pub fn parse_subnet(input: &str) -> Result<Subnet> {
    let net = parse_net(input)?;
    Ok(Subnet::new(net.network(), net.prefix_len()))
}

/// [`parse_subnet`], then reject subnets with more than `max_hosts` usable
/// addresses.
pub fn parse_bounded(input: &str, max_hosts: u64) -> Result<Subnet> {
    let subnet = parse_subnet(input)?;
    if subnet.total_usable_hosts > max_hosts {
        return Err(DiscoverError::SubnetTooLarge {
            cidr: subnet.cidr,
            hosts: subnet.total_usable_hosts,
            limit: max_hosts,
        });
    }
    Ok(subnet)
}

/// Expand `input` into its subnet descriptor and usable host addresses.
///
/// Network and broadcast addresses are excluded below /31; for /31 and /32
/// every address is usable.
pub fn enumerate(input: &str) -> Result<Enumeration> {
    let net = parse_net(input)?;
    let subnet = Subnet::new(net.network(), net.prefix_len());
    let addresses: Vec<Address> = net.hosts().map(Address::unknown).collect();

    debug_assert_eq!(addresses.len() as u64, subnet.total_usable_hosts);

    Ok(Enumeration { subnet, addresses })
}

fn parse_net(input: &str) -> Result<Ipv4Net> {
    let trimmed = input.trim();
    let invalid = |reason: String| DiscoverError::InvalidRange {
        input: input.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("empty input".to_string()));
    }

    let net = if trimmed.contains('/') {
        trimmed
            .parse::<Ipv4Net>()
            .map_err(|e| invalid(e.to_string()))?
    } else {
        let addr = trimmed
            .parse::<Ipv4Addr>()
            .map_err(|e| invalid(e.to_string()))?;
        Ipv4Net::from(addr)
    };

    Ok(net.trunc())
}
