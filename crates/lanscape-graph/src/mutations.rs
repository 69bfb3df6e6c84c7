//! Write operations for the topology graph.
//!
//! A scan replaces everything the graph knows about the scanned subnet:
//! the previous IP and Interface nodes are deleted and the new state is
//! written in the same transaction, so readers never see a half-written
//! subnet. Nodes are identified by natural keys (`Subnet.cidr`,
//! `IP.address`, `Host.name`, `Interface.name`).

use std::net::Ipv4Addr;

use chrono::Utc;
use lanscape_core::ScanReport;
use neo4rs::{query, Txn};

use crate::client::{GraphClient, GraphError};

/// Maximum addresses sent in one UNWIND parameter list.
const UNWIND_CHUNK: usize = 1_000;

impl GraphClient {
    /// Replace the stored topology of `report.subnet` with the report's contents.
    ///
    /// `local_address` marks the scanner's own interface as `primary`.
    pub async fn replace_subnet(
        &self,
        report: &ScanReport,
        local_address: Option<Ipv4Addr>,
    ) -> Result<(), GraphError> {
        let mut txn = self.transaction().await?;

        match write_subnet(&mut txn, report, local_address).await {
            Ok(()) => {
                txn.commit().await?;
                tracing::debug!(
                    cidr = %report.subnet.cidr,
                    used = report.used_count(),
                    available = report.available_count(),
                    "Subnet topology written to graph"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "Graph rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Delete a subnet and every IP/Interface node attached to it.
    /// Returns the number of IP nodes removed.
    pub async fn delete_subnet(&self, cidr: &str) -> Result<i64, GraphError> {
        let q = query(
            "MATCH (s:Subnet {cidr: $cidr})
             OPTIONAL MATCH (s)<-[:BELONGS_TO]-(ip:IP)
             OPTIONAL MATCH (ip)<-[:HAS_IP]-(i:Interface)
             WITH s, collect(DISTINCT ip) AS ips, collect(DISTINCT i) AS ifaces
             FOREACH (n IN ifaces | DETACH DELETE n)
             FOREACH (n IN ips | DETACH DELETE n)
             DETACH DELETE s
             RETURN size(ips) AS cnt",
        )
        .param("cidr", cidr.to_string());

        match self.first_row(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}

async fn write_subnet(
    txn: &mut Txn,
    report: &ScanReport,
    local_address: Option<Ipv4Addr>,
) -> Result<(), GraphError> {
    let subnet = &report.subnet;
    let now = Utc::now().to_rfc3339();

    // Clear the previous scan of this subnet.
    txn.run(
        query(
            "MATCH (s:Subnet {cidr: $cidr})<-[:BELONGS_TO]-(ip:IP)
             OPTIONAL MATCH (ip)<-[:HAS_IP]-(i:Interface)
             DETACH DELETE i, ip",
        )
        .param("cidr", subnet.cidr.clone()),
    )
    .await?;

    txn.run(
        query(
            "MERGE (s:Subnet {cidr: $cidr})
             SET s.network = $network, s.netmask = $netmask,
                 s.total_ips = $total, s.used_ips = $used,
                 s.available_ips = $available,
                 s.available_percentage = $available_pct,
                 s.last_scan_id = $scan_id, s.last_scanned_at = $now",
        )
        .param("cidr", subnet.cidr.clone())
        .param("network", subnet.network_address.to_string())
        .param("netmask", subnet.netmask().to_string())
        .param("total", subnet.total_usable_hosts as i64)
        .param("used", report.used_count() as i64)
        .param("available", report.available_count() as i64)
        .param("available_pct", round2(report.available_percentage()))
        .param("scan_id", report.scan_id.to_string())
        .param("now", now.clone()),
    )
    .await?;

    let available: Vec<String> = report
        .available_addresses()
        .map(|a| a.value.to_string())
        .collect();
    for chunk in available.chunks(UNWIND_CHUNK) {
        txn.run(
            query(
                "MATCH (s:Subnet {cidr: $cidr})
                 UNWIND $addresses AS address
                 MERGE (ip:IP {address: address})
                 SET ip.status = 'available', ip.last_seen = $now
                 MERGE (ip)-[:BELONGS_TO]->(s)",
            )
            .param("cidr", subnet.cidr.clone())
            .param("addresses", chunk.to_vec())
            .param("now", now.clone()),
        )
        .await?;
    }

    for address in report.used_addresses() {
        let ip = address.value;
        let host = host_name(ip);
        let kind = if local_address == Some(ip) {
            "primary"
        } else {
            "secondary"
        };

        txn.run(
            query(
                "MATCH (s:Subnet {cidr: $cidr})
                 MERGE (h:Host {name: $host})
                 MERGE (i:Interface {name: $interface})
                 SET i.type = $type
                 MERGE (h)-[:HAS_INTERFACE]->(i)
                 MERGE (ip:IP {address: $ip})
                 SET ip.status = 'used', ip.last_seen = $now
                 MERGE (i)-[:HAS_IP]->(ip)
                 MERGE (ip)-[:BELONGS_TO]->(s)",
            )
            .param("cidr", subnet.cidr.clone())
            .param("host", host.clone())
            .param("interface", format!("{host}-{kind}"))
            .param("type", kind)
            .param("ip", ip.to_string())
            .param("now", now.clone()),
        )
        .await?;
    }

    Ok(())
}

/// Graph name of the host behind a live address, e.g. `host-10-0-0-7`.
pub fn host_name(ip: Ipv4Addr) -> String {
    format!("host-{}", ip.to_string().replace('.', "-"))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_names_replace_dots() {
        assert_eq!(host_name(Ipv4Addr::new(192, 168, 1, 20)), "host-192-168-1-20");
    }

    #[test]
    fn percentages_round_to_two_places() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(50.0), 50.0);
        assert_eq!(round2(0.004), 0.0);
    }
}
