//! Merge liveness and port results into a [`ScanReport`].

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lanscape_core::{Address, OpenPort, ScanReport, Subnet};
use uuid::Uuid;

use crate::error::{DiscoverError, Result};

/// Identity and timing carried into the report.
#[derive(Debug, Clone, Copy)]
pub struct ScanMeta {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Build the report for `subnet`.
///
/// `liveness` must cover exactly the subnet's usable addresses. Every key in
/// `ports` must be an address that answered; live addresses missing from
/// `ports` get an empty set.
pub fn assemble(
    subnet: &Subnet,
    liveness: &BTreeMap<Ipv4Addr, bool>,
    ports: &BTreeMap<Ipv4Addr, BTreeSet<OpenPort>>,
    meta: ScanMeta,
) -> Result<ScanReport> {
    if liveness.len() as u64 != subnet.total_usable_hosts {
        return Err(DiscoverError::InconsistentResult(format!(
            "{} has {} usable hosts but {} liveness results",
            subnet.cidr,
            subnet.total_usable_hosts,
            liveness.len()
        )));
    }

    let reserved = reserved_addresses(subnet);
    if let Some(stray) = liveness
        .keys()
        .find(|addr| !subnet.contains(**addr) || reserved.contains(*addr))
    {
        return Err(DiscoverError::InconsistentResult(format!(
            "{stray} is not a usable host of {}",
            subnet.cidr
        )));
    }

    if let Some(addr) = ports.keys().find(|addr| liveness.get(*addr) != Some(&true)) {
        return Err(DiscoverError::InconsistentResult(format!(
            "port results for {addr}, which did not answer liveness"
        )));
    }

    // BTreeMap iteration keeps the addresses in ascending order.
    let addresses: Vec<Address> = liveness
        .iter()
        .map(|(addr, up)| Address::unknown(*addr).resolve(*up))
        .collect();

    let open_ports: BTreeMap<Ipv4Addr, BTreeSet<OpenPort>> = addresses
        .iter()
        .filter(|a| a.is_up())
        .map(|a| (a.value, ports.get(&a.value).cloned().unwrap_or_default()))
        .collect();

    Ok(ScanReport {
        scan_id: meta.scan_id,
        subnet: subnet.clone(),
        addresses,
        open_ports,
        started_at: meta.started_at,
        completed_at: Utc::now(),
        duration_ms: meta.elapsed.as_millis() as u64,
    })
}

/// Network and broadcast addresses, which are not hosts below /31.
fn reserved_addresses(subnet: &Subnet) -> Vec<Ipv4Addr> {
    if subnet.prefix_len >= 31 {
        return Vec::new();
    }
    let network = u32::from(subnet.network_address);
    let broadcast = network | !u32::from(subnet.netmask());
    vec![Ipv4Addr::from(network), Ipv4Addr::from(broadcast)]
}
