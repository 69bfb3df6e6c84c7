//! Subnet scan pipeline: enumerate, liveness pass, port pass, assemble.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lanscape_core::ScanReport;
use uuid::Uuid;

use crate::assemble::{assemble, ScanMeta};
use crate::coordinator::{run_liveness_pass, run_port_pass};
use crate::error::Result;
use crate::persist::TopologySink;
use crate::ports::PortTable;
use crate::probe::{LivenessProbe, PortProbe};
use crate::range;

/// Tuning for a single scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub liveness_timeout: Duration,
    pub liveness_concurrency: usize,
    pub port_timeout: Duration,
    pub port_concurrency: usize,
    pub port_table: PortTable,
    /// Stop after the liveness pass; live hosts get no port results.
    pub skip_port_scan: bool,
    /// Refuse subnets with more usable hosts than this.
    pub max_hosts: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            liveness_timeout: Duration::from_millis(1000),
            liveness_concurrency: 100,
            port_timeout: Duration::from_millis(1000),
            port_concurrency: 500,
            port_table: PortTable::well_known(),
            skip_port_scan: false,
            max_hosts: 65_536,
        }
    }
}

pub struct SubnetScanner {
    options: ScanOptions,
    liveness: Arc<dyn LivenessProbe>,
    ports: Arc<dyn PortProbe>,
}

impl SubnetScanner {
    pub fn new(
        options: ScanOptions,
        liveness: Arc<dyn LivenessProbe>,
        ports: Arc<dyn PortProbe>,
    ) -> Self {
        Self {
            options,
            liveness,
            ports,
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan every usable address in `target` (`a.b.c.d/n` or a bare address).
    ///
    /// Input is validated before any probe is sent. A fatal probe error
    /// aborts the scan and no report is produced.
    pub async fn scan(&self, target: &str) -> Result<ScanReport> {
        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let subnet = range::parse_bounded(target, self.options.max_hosts)?;
        let enumeration = range::enumerate(target)?;

        tracing::info!(
            scan_id = %scan_id,
            cidr = %subnet.cidr,
            hosts = subnet.total_usable_hosts,
            liveness_probe = self.liveness.name(),
            ports = self.options.port_table.len(),
            "Starting subnet scan"
        );

        let liveness = run_liveness_pass(
            &enumeration.values(),
            Arc::clone(&self.liveness),
            self.options.liveness_timeout,
            self.options.liveness_concurrency,
        )
        .await?;

        let live: Vec<Ipv4Addr> = liveness
            .iter()
            .filter(|(_, up)| **up)
            .map(|(addr, _)| *addr)
            .collect();

        let open_ports = if self.options.skip_port_scan || live.is_empty() {
            BTreeMap::new()
        } else {
            run_port_pass(
                &live,
                &self.options.port_table,
                Arc::clone(&self.ports),
                self.options.port_timeout,
                self.options.port_concurrency,
            )
            .await?
        };

        let report = assemble(
            &enumeration.subnet,
            &liveness,
            &open_ports,
            ScanMeta {
                scan_id,
                started_at,
                elapsed: start.elapsed(),
            },
        )?;

        tracing::info!(
            scan_id = %scan_id,
            cidr = %report.subnet.cidr,
            used = report.used_count(),
            available = report.available_count(),
            open_ports = report.open_port_count(),
            duration_ms = report.duration_ms,
            "Subnet scan complete"
        );

        Ok(report)
    }

    /// Scan `target` and hand the report to `sink`.
    ///
    /// Nothing is written when the scan fails. When the sink fails the
    /// error is returned and the report is dropped.
    pub async fn scan_and_persist(
        &self,
        target: &str,
        sink: &dyn TopologySink,
    ) -> Result<ScanReport> {
        let report = self.scan(target).await?;
        sink.persist_topology(&report).await?;
        Ok(report)
    }
}
