//! Node/link view of the persisted topology, as consumed by the graph UI.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::types::ScanReport;

/// One IP address and the subnet it belongs to, as read back from the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub ip: String,
    pub subnet: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Ip,
    Subnet,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_ports: Option<Vec<u16>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TopologyLink {
    pub source: String,
    pub target: String,
}

/// The `{nodes, links}` document returned by `GET /topology`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyView {
    pub nodes: Vec<TopologyNode>,
    pub links: Vec<TopologyLink>,
}

impl TopologyView {
    /// Build the view from graph memberships and per-IP open ports.
    ///
    /// Nodes are de-duplicated. IPs are visited in ascending numeric order so
    /// the output does not depend on the order the store returned rows in.
    pub fn build(memberships: &[Membership], open_ports: &HashMap<String, Vec<u16>>) -> Self {
        let mut rows: Vec<&Membership> = memberships.iter().collect();
        rows.sort_by(|a, b| {
            sort_key(&a.ip)
                .cmp(&sort_key(&b.ip))
                .then_with(|| a.subnet.cmp(&b.subnet))
        });

        let mut nodes = Vec::new();
        let mut seen: HashSet<(NodeKind, &str)> = HashSet::new();
        let mut links = BTreeSet::new();

        for row in rows {
            if seen.insert((NodeKind::Ip, row.ip.as_str())) {
                let ports = open_ports.get(&row.ip).map(|p| {
                    let mut p = p.clone();
                    p.sort_unstable();
                    p.dedup();
                    p
                });
                nodes.push(TopologyNode {
                    id: row.ip.clone(),
                    kind: NodeKind::Ip,
                    open_ports: ports,
                });
            }

            if let Some(subnet) = &row.subnet {
                if seen.insert((NodeKind::Subnet, subnet.as_str())) {
                    nodes.push(TopologyNode {
                        id: subnet.clone(),
                        kind: NodeKind::Subnet,
                        open_ports: None,
                    });
                }
                links.insert(TopologyLink {
                    source: row.ip.clone(),
                    target: subnet.clone(),
                });
            }
        }

        Self {
            nodes,
            links: links.into_iter().collect(),
        }
    }

    /// Build the view a freshly persisted report would produce.
    pub fn from_report(report: &ScanReport) -> Self {
        let memberships: Vec<Membership> = report
            .addresses
            .iter()
            .map(|a| Membership {
                ip: a.value.to_string(),
                subnet: Some(report.subnet.cidr.clone()),
            })
            .collect();

        let open_ports: HashMap<String, Vec<u16>> = report
            .open_ports
            .iter()
            .filter(|(_, ports)| !ports.is_empty())
            .map(|(ip, ports)| (ip.to_string(), ports.iter().map(|p| p.port).collect()))
            .collect();

        Self::build(&memberships, &open_ports)
    }
}

/// Numeric order for dotted quads, anything unparsable after them.
fn sort_key(ip: &str) -> (Option<Ipv4Addr>, &str) {
    match ip.parse::<Ipv4Addr>() {
        Ok(addr) => (Some(addr), ip),
        Err(_) => (None, ip),
    }
}
