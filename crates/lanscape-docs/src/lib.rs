//! lanscape-docs: Document store for open-port results.
//!
//! Each live address with open ports gets one JSON document holding the
//! ports found by the most recent scan. Documents are keyed by IP address
//! and replaced wholesale on every scan that covers that address.

pub mod store;

pub use store::{DocumentStore, FileDocumentStore, StoreError};

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use lanscape_core::{OpenPort, ScanReport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open ports recorded for one address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortDocument {
    pub ip_address: Ipv4Addr,
    pub open_ports: Vec<OpenPort>,
    /// Scan that produced this document.
    pub scan_id: Uuid,
    pub scanned_at: DateTime<Utc>,
}

impl PortDocument {
    /// Port numbers only, as shown on topology nodes.
    pub fn port_numbers(&self) -> Vec<u16> {
        self.open_ports.iter().map(|p| p.port).collect()
    }
}

/// Split a report into the documents to write and the addresses whose
/// documents must be dropped (scanned, but no open port this time).
pub fn documents_for_report(report: &ScanReport) -> (Vec<PortDocument>, Vec<Ipv4Addr>) {
    let mut upserts = Vec::new();
    let mut removals = Vec::new();

    for address in &report.addresses {
        match report.open_ports_for(address.value) {
            Some(ports) if !ports.is_empty() => upserts.push(PortDocument {
                ip_address: address.value,
                open_ports: ports.iter().cloned().collect(),
                scan_id: report.scan_id,
                scanned_at: report.completed_at,
            }),
            _ => removals.push(address.value),
        }
    }

    (upserts, removals)
}
