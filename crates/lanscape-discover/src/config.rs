//! Configuration for the lanscape-discover scanner.
//!
//! Settings come from an optional `lanscape.{toml,yaml,json}` file layered
//! under `LANSCAPE__` environment variables (`LANSCAPE__DISCOVER__PORT_TIMEOUT_MS`,
//! `LANSCAPE__NEO4J__PASSWORD`, ...).

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use lanscape_graph::GraphConfig;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};
use crate::local;
use crate::ports::PortTable;
use crate::probe::{
    IcmpProbe, LivenessProbe, PingCommandProbe, PortProbe, TcpConnectProbe, TcpPortProbe,
};
use crate::scanner::{ScanOptions, SubnetScanner};

/// The `[discover]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// How liveness is decided (default: icmp).
    #[serde(default)]
    pub liveness_method: LivenessMethod,

    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,

    /// Maximum liveness probes in flight.
    #[serde(default = "default_liveness_concurrency")]
    pub liveness_concurrency: usize,

    /// Binary used by the `ping` liveness method.
    #[serde(default = "default_ping_path")]
    pub ping_path: String,

    /// Ports tried by the `tcp` liveness method.
    #[serde(default = "default_tcp_liveness_ports")]
    pub tcp_liveness_ports: Vec<u16>,

    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Maximum port probes in flight.
    #[serde(default = "default_port_concurrency")]
    pub port_concurrency: usize,

    #[serde(default)]
    pub port_policy: PortPolicy,

    #[serde(default)]
    pub skip_port_scan: bool,

    /// Largest subnet (in usable hosts) a single scan accepts.
    #[serde(default = "default_max_hosts")]
    pub max_hosts: u64,

    /// The scanner's own address; its interface is stored as `primary`.
    #[serde(default)]
    pub local_address: Option<Ipv4Addr>,

    /// Root directory of the port document store.
    #[serde(default = "default_document_dir")]
    pub document_dir: String,

    /// Bind address for `serve`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LivenessMethod {
    /// Echo request over an ICMP socket.
    #[default]
    Icmp,
    /// The system `ping` binary, one process per address.
    Ping,
    /// TCP connect to a few common ports.
    Tcp,
}

/// Which ports are probed on live hosts.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PortPolicy {
    /// The 12 well-known service ports.
    #[default]
    WellKnown,
    /// Every port in `start..=end`.
    Range { start: u16, end: u16 },
    /// Explicit port to service-name map. Keys are port numbers.
    Custom { ports: BTreeMap<String, String> },
}

impl PortPolicy {
    pub fn to_table(&self) -> Result<PortTable> {
        match self {
            Self::WellKnown => Ok(PortTable::well_known()),
            Self::Range { start, end } => PortTable::range(*start, *end),
            Self::Custom { ports } => {
                let mut entries = BTreeMap::new();
                for (port, name) in ports {
                    let port: u16 = port.trim().parse().map_err(|_| {
                        DiscoverError::Config(format!("invalid port number '{port}'"))
                    })?;
                    entries.insert(port, name.clone());
                }
                PortTable::custom(entries)
            }
        }
    }
}

fn default_liveness_timeout_ms() -> u64 {
    1000
}

fn default_liveness_concurrency() -> usize {
    100
}

fn default_ping_path() -> String {
    "ping".to_string()
}

fn default_tcp_liveness_ports() -> Vec<u16> {
    vec![80, 443, 22]
}

fn default_port_timeout_ms() -> u64 {
    1000
}

fn default_port_concurrency() -> usize {
    500
}

fn default_max_hosts() -> u64 {
    65_536
}

fn default_document_dir() -> String {
    "./data/documents".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            liveness_method: LivenessMethod::default(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
            liveness_concurrency: default_liveness_concurrency(),
            ping_path: default_ping_path(),
            tcp_liveness_ports: default_tcp_liveness_ports(),
            port_timeout_ms: default_port_timeout_ms(),
            port_concurrency: default_port_concurrency(),
            port_policy: PortPolicy::default(),
            skip_port_scan: false,
            max_hosts: default_max_hosts(),
            local_address: None,
            document_dir: default_document_dir(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl DiscoverConfig {
    /// Validate and convert into scan tuning.
    pub fn scan_options(&self) -> Result<ScanOptions> {
        if self.liveness_timeout_ms == 0 || self.port_timeout_ms == 0 {
            return Err(DiscoverError::Config("timeouts must be positive".to_string()));
        }
        if self.liveness_concurrency == 0 || self.port_concurrency == 0 {
            return Err(DiscoverError::Config(
                "concurrency limits must be positive".to_string(),
            ));
        }

        Ok(ScanOptions {
            liveness_timeout: Duration::from_millis(self.liveness_timeout_ms),
            liveness_concurrency: self.liveness_concurrency,
            port_timeout: Duration::from_millis(self.port_timeout_ms),
            port_concurrency: self.port_concurrency,
            port_table: self.port_policy.to_table()?,
            skip_port_scan: self.skip_port_scan,
            max_hosts: self.max_hosts,
        })
    }

    /// Build the configured liveness probe. The ICMP probe opens its socket
    /// here, so this must run inside a Tokio runtime.
    pub fn liveness_probe(&self) -> Result<Arc<dyn LivenessProbe>> {
        let probe: Arc<dyn LivenessProbe> = match self.liveness_method {
            LivenessMethod::Icmp => Arc::new(IcmpProbe::new()?),
            LivenessMethod::Ping => Arc::new(PingCommandProbe::new(&self.ping_path)),
            LivenessMethod::Tcp => {
                if self.tcp_liveness_ports.is_empty() {
                    return Err(DiscoverError::Config(
                        "tcp liveness needs at least one port".to_string(),
                    ));
                }
                Arc::new(TcpConnectProbe::new(self.tcp_liveness_ports.clone()))
            }
        };
        Ok(probe)
    }

    /// `local_address`, or this host's detected address when it is unset.
    pub fn effective_local_address(&self) -> Option<Ipv4Addr> {
        if self.local_address.is_some() {
            return self.local_address;
        }
        match local::detect() {
            Ok(network) => Some(network.address),
            Err(e) => {
                tracing::warn!(error = %e, "No local address; every interface will be stored as secondary");
                None
            }
        }
    }

    /// A scanner wired with the configured probes.
    pub fn build_scanner(&self) -> Result<SubnetScanner> {
        let options = self.scan_options()?;
        let ports: Arc<dyn PortProbe> = Arc::new(TcpPortProbe);
        Ok(SubnetScanner::new(options, self.liveness_probe()?, ports))
    }
}

/// Read the optional config file and `LANSCAPE__*` environment overrides.
pub fn load_settings(file_prefix: &str) -> Result<config::Config> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LANSCAPE")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| DiscoverError::Config(e.to_string()))
}

/// The `discover` section, or defaults if it is absent.
pub fn discover_config(settings: &config::Config) -> Result<DiscoverConfig> {
    match settings.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(DiscoverError::Config(e.to_string())),
    }
}

/// Neo4j connection settings from the `neo4j` section.
pub fn graph_config(settings: &config::Config) -> GraphConfig {
    let defaults = GraphConfig::default();
    GraphConfig {
        uri: settings.get_string("neo4j.uri").unwrap_or(defaults.uri),
        user: settings.get_string("neo4j.user").unwrap_or(defaults.user),
        password: settings
            .get_string("neo4j.password")
            .unwrap_or(defaults.password),
        max_connections: settings
            .get_int("neo4j.max_connections")
            .ok()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(defaults.max_connections),
        fetch_size: defaults.fetch_size,
    }
}
