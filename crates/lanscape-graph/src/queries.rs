//! Read operations for the topology graph.

use lanscape_core::Membership;
use neo4rs::query;

use crate::client::{GraphClient, GraphError};

/// Subnet statistics as stored on the `Subnet` node.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubnetRecord {
    pub cidr: String,
    pub network: String,
    pub netmask: String,
    pub total_ips: i64,
    pub used_ips: i64,
    pub available_ips: i64,
    pub available_percentage: f64,
    pub last_scan_id: String,
}

impl GraphClient {
    /// Every IP node with the CIDR of the subnet it belongs to, if any.
    pub async fn list_memberships(&self) -> Result<Vec<Membership>, GraphError> {
        let q = query(
            "MATCH (ip:IP)
             OPTIONAL MATCH (ip)-[:BELONGS_TO]->(s:Subnet)
             RETURN ip.address AS ip, s.cidr AS subnet",
        );

        let rows = self.rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let ip: String = row.get("ip").map_err(|e| column_err("ip", e))?;
            let subnet: Option<String> = row.get("subnet").map_err(|e| column_err("subnet", e))?;
            results.push(Membership { ip, subnet });
        }
        Ok(results)
    }

    /// Fetch the stored statistics for one subnet.
    pub async fn get_subnet(&self, cidr: &str) -> Result<Option<SubnetRecord>, GraphError> {
        let q = query(
            "MATCH (s:Subnet {cidr: $cidr})
             RETURN s.cidr AS cidr, s.network AS network, s.netmask AS netmask,
                    s.total_ips AS total_ips, s.used_ips AS used_ips,
                    s.available_ips AS available_ips,
                    s.available_percentage AS available_percentage,
                    s.last_scan_id AS last_scan_id",
        )
        .param("cidr", cidr.to_string());

        let Some(row) = self.first_row(q).await? else {
            return Ok(None);
        };

        Ok(Some(SubnetRecord {
            cidr: row.get("cidr").map_err(|e| column_err("cidr", e))?,
            network: row.get("network").map_err(|e| column_err("network", e))?,
            netmask: row.get("netmask").map_err(|e| column_err("netmask", e))?,
            total_ips: row.get("total_ips").map_err(|e| column_err("total_ips", e))?,
            used_ips: row.get("used_ips").map_err(|e| column_err("used_ips", e))?,
            available_ips: row
                .get("available_ips")
                .map_err(|e| column_err("available_ips", e))?,
            available_percentage: row
                .get("available_percentage")
                .map_err(|e| column_err("available_percentage", e))?,
            last_scan_id: row
                .get("last_scan_id")
                .map_err(|e| column_err("last_scan_id", e))?,
        }))
    }

    /// Count IP nodes attached to a subnet, optionally filtered by status.
    pub async fn count_ips(&self, cidr: &str, status: Option<&str>) -> Result<i64, GraphError> {
        let q = match status {
            Some(status) => query(
                "MATCH (ip:IP {status: $status})-[:BELONGS_TO]->(:Subnet {cidr: $cidr})
                 RETURN count(ip) AS cnt",
            )
            .param("status", status.to_string()),
            None => query(
                "MATCH (ip:IP)-[:BELONGS_TO]->(:Subnet {cidr: $cidr})
                 RETURN count(ip) AS cnt",
            ),
        }
        .param("cidr", cidr.to_string());

        match self.first_row(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}

fn column_err(column: &str, e: impl std::fmt::Display) -> GraphError {
    GraphError::Deserialize {
        column: column.to_string(),
        message: e.to_string(),
    }
}
