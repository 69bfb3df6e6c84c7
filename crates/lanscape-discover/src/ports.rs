//! The table of TCP ports probed on every live address.

use std::collections::BTreeMap;

use lanscape_core::OpenPort;

use crate::error::{DiscoverError, Result};

/// Service name used when a port has no entry in the lookup table.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Default ports and their service names.
pub const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5900, "VNC"),
];

/// Name of a well-known service, if the port is in the default table.
pub fn well_known_service(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, name)| *name)
}

/// Ordered set of ports to probe, each mapped to a service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortTable {
    entries: BTreeMap<u16, String>,
}

impl PortTable {
    /// The 12-port default table.
    pub fn well_known() -> Self {
        Self {
            entries: WELL_KNOWN_PORTS
                .iter()
                .map(|(p, name)| (*p, name.to_string()))
                .collect(),
        }
    }

    /// Every port in `start..=end`, named from the well-known table.
    pub fn range(start: u16, end: u16) -> Result<Self> {
        if start == 0 || start > end {
            return Err(DiscoverError::Config(format!(
                "invalid port range {start}-{end}"
            )));
        }
        Ok(Self {
            entries: (start..=end)
                .map(|p| (p, well_known_service(p).unwrap_or(UNKNOWN_SERVICE).to_string()))
                .collect(),
        })
    }

    /// A caller-supplied table.
    pub fn custom(entries: BTreeMap<u16, String>) -> Result<Self> {
        if entries.is_empty() {
            return Err(DiscoverError::Config("port table is empty".to_string()));
        }
        if entries.contains_key(&0) {
            return Err(DiscoverError::Config("port 0 cannot be probed".to_string()));
        }
        Ok(Self { entries })
    }

    /// Ports in ascending order.
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.keys().copied()
    }

    pub fn service_name(&self, port: u16) -> &str {
        self.entries
            .get(&port)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SERVICE)
    }

    pub fn open_port(&self, port: u16) -> OpenPort {
        OpenPort::new(port, self.service_name(port))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PortTable {
    fn default() -> Self {
        Self::well_known()
    }
}
