//! Core scan types.
//!
//! These types describe one scan of one IPv4 subnet. They are created fresh
//! for every scan and are never mutated once the report has been assembled;
//! the stores and the HTTP layer only read them.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Subnet ────────────────────────────────────────────────────────

/// An IPv4 subnet in canonical form (host bits cleared).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subnet {
    /// Canonical `network/prefix` string, e.g. `192.168.1.0/24`.
    pub cidr: String,
    pub network_address: Ipv4Addr,
    pub prefix_len: u8,
    /// Usable host count: network and broadcast are excluded below /31,
    /// every address counts for /31 and /32.
    pub total_usable_hosts: u64,
}

impl Subnet {
    /// Build a subnet descriptor. Host bits in `address` are cleared.
    ///
    /// `prefix_len` must be at most 32.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        debug_assert!(prefix_len <= 32);
        let mask = mask_bits(prefix_len);
        let network_address = Ipv4Addr::from(u32::from(address) & mask);
        let total_usable_hosts = match prefix_len {
            32 => 1,
            31 => 2,
            p => (1u64 << (32 - u32::from(p))) - 2,
        };

        Self {
            cidr: format!("{network_address}/{prefix_len}"),
            network_address,
            prefix_len,
            total_usable_hosts,
        }
    }

    /// Dotted-quad netmask for this prefix.
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(mask_bits(self.prefix_len))
    }

    /// Whether `addr` falls inside this subnet (network and broadcast included).
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = mask_bits(self.prefix_len);
        u32::from(addr) & mask == u32::from(self.network_address)
    }
}

fn mask_bits(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p.min(32))),
    }
}

// ── Address ───────────────────────────────────────────────────────

/// Liveness of an address within one scan pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
    Unknown,
    Up,
    Down,
}

/// A single host address of the scanned subnet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address {
    pub value: Ipv4Addr,
    pub status: AddressStatus,
}

impl Address {
    /// A freshly enumerated address that has not been probed yet.
    pub fn unknown(value: Ipv4Addr) -> Self {
        Self {
            value,
            status: AddressStatus::Unknown,
        }
    }

    /// Record the liveness outcome. An address is resolved exactly once per pass.
    pub fn resolve(self, up: bool) -> Self {
        debug_assert_eq!(self.status, AddressStatus::Unknown);
        Self {
            value: self.value,
            status: if up {
                AddressStatus::Up
            } else {
                AddressStatus::Down
            },
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == AddressStatus::Up
    }
}

// ── OpenPort ──────────────────────────────────────────────────────

/// A TCP port that accepted a connection on a live address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpenPort {
    pub port: u16,
    #[serde(rename = "service")]
    pub service_name: String,
}

impl OpenPort {
    pub fn new(port: u16, service_name: impl Into<String>) -> Self {
        Self {
            port,
            service_name: service_name.into(),
        }
    }
}

// ── ScanReport ────────────────────────────────────────────────────

/// The immutable result of one scan.
///
/// Invariants (upheld by the assembler that builds it):
/// - every address belongs to `subnet`, and there is exactly one per usable host
/// - `open_ports` only has keys for addresses whose status is `Up`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub subnet: Subnet,
    /// All usable addresses in ascending order, each resolved to Up or Down.
    pub addresses: Vec<Address>,
    /// Open ports per Up address. Every Up address has an entry, possibly empty.
    pub open_ports: BTreeMap<Ipv4Addr, BTreeSet<OpenPort>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScanReport {
    /// Addresses that answered the liveness probe.
    pub fn used_addresses(&self) -> impl Iterator<Item = &Address> {
        self.addresses.iter().filter(|a| a.is_up())
    }

    /// Addresses that did not answer, i.e. presumed free.
    pub fn available_addresses(&self) -> impl Iterator<Item = &Address> {
        self.addresses.iter().filter(|a| !a.is_up())
    }

    pub fn used_count(&self) -> u64 {
        self.used_addresses().count() as u64
    }

    pub fn available_count(&self) -> u64 {
        self.available_addresses().count() as u64
    }

    /// Share of usable hosts that did not respond, in percent.
    pub fn available_percentage(&self) -> f64 {
        if self.subnet.total_usable_hosts == 0 {
            return 0.0;
        }
        self.available_count() as f64 / self.subnet.total_usable_hosts as f64 * 100.0
    }

    /// Open ports found on `addr`, if it was up.
    pub fn open_ports_for(&self, addr: Ipv4Addr) -> Option<&BTreeSet<OpenPort>> {
        self.open_ports.get(&addr)
    }

    pub fn open_port_count(&self) -> usize {
        self.open_ports.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: &[(Ipv4Addr, bool)], subnet: Subnet) -> ScanReport {
        let addresses: Vec<Address> = statuses
            .iter()
            .map(|(ip, up)| Address::unknown(*ip).resolve(*up))
            .collect();
        let open_ports = addresses
            .iter()
            .filter(|a| a.is_up())
            .map(|a| (a.value, BTreeSet::new()))
            .collect();
        let now = Utc::now();
        ScanReport {
            scan_id: Uuid::new_v4(),
            subnet,
            addresses,
            open_ports,
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    #[test]
    fn subnet_clears_host_bits() {
        let subnet = Subnet::new(Ipv4Addr::new(192, 168, 1, 77), 24);
        assert_eq!(subnet.cidr, "192.168.1.0/24");
        assert_eq!(subnet.network_address, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(subnet.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(subnet.total_usable_hosts, 254);
    }

    #[test]
    fn usable_host_counts_follow_ipv4_rules() {
        let addr = Ipv4Addr::new(10, 0, 0, 0);
        assert_eq!(Subnet::new(addr, 30).total_usable_hosts, 2);
        assert_eq!(Subnet::new(addr, 31).total_usable_hosts, 2);
        assert_eq!(Subnet::new(addr, 32).total_usable_hosts, 1);
        assert_eq!(Subnet::new(addr, 16).total_usable_hosts, 65_534);
        assert_eq!(Subnet::new(addr, 0).total_usable_hosts, (1u64 << 32) - 2);
    }

    #[test]
    fn subnet_contains() {
        let subnet = Subnet::new(Ipv4Addr::new(10, 1, 2, 0), 23);
        assert!(subnet.contains(Ipv4Addr::new(10, 1, 3, 255)));
        assert!(!subnet.contains(Ipv4Addr::new(10, 1, 4, 0)));
        assert!(Subnet::new(Ipv4Addr::UNSPECIFIED, 0).contains(Ipv4Addr::BROADCAST));
    }

    #[test]
    fn address_resolves_once() {
        let addr = Address::unknown(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(addr.status, AddressStatus::Unknown);
        assert_eq!(addr.resolve(true).status, AddressStatus::Up);
        assert_eq!(addr.resolve(false).status, AddressStatus::Down);
    }

    #[test]
    fn counts_and_available_percentage() {
        let subnet = Subnet::new(Ipv4Addr::new(192, 168, 1, 0), 29);
        let statuses: Vec<(Ipv4Addr, bool)> = (1..=6)
            .map(|i| (Ipv4Addr::new(192, 168, 1, i), i <= 2))
            .collect();
        let r = report(&statuses, subnet);

        assert_eq!(r.used_count(), 2);
        assert_eq!(r.available_count(), 4);
        assert_eq!(r.used_count() + r.available_count(), r.subnet.total_usable_hosts);
        let pct = r.available_percentage();
        assert!((pct - 66.666_666).abs() < 0.001, "got {pct}");
    }

    #[test]
    fn open_port_serializes_service_field() {
        let json = serde_json::to_value(OpenPort::new(80, "HTTP")).unwrap();
        assert_eq!(json, serde_json::json!({"port": 80, "service": "HTTP"}));
    }

    #[test]
    fn open_ports_order_by_port_number() {
        let mut set = BTreeSet::new();
        set.insert(OpenPort::new(443, "HTTPS"));
        set.insert(OpenPort::new(22, "SSH"));
        set.insert(OpenPort::new(80, "HTTP"));
        let ports: Vec<u16> = set.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![22, 80, 443]);
    }
}
