//! Handing finished scans to the graph and document stores, and reading the
//! combined topology back.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

use async_trait::async_trait;
use lanscape_core::{ScanReport, TopologyView};
use lanscape_docs::{documents_for_report, DocumentStore, FileDocumentStore, StoreError};
use lanscape_graph::{GraphClient, GraphConfig, GraphError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Graph store: {0}")]
    Graph(#[from] GraphError),

    #[error("Document store: {0}")]
    Documents(#[from] StoreError),

    #[error("Store task failed: {0}")]
    TaskJoin(String),
}

/// Destination for completed scan reports.
#[async_trait]
pub trait TopologySink: Send + Sync {
    async fn persist_topology(&self, report: &ScanReport) -> Result<(), PersistError>;
}

/// Graph plus document store, opened for one operation and dropped after.
pub struct StoreSink {
    graph: GraphClient,
    documents: FileDocumentStore,
    local_address: Option<Ipv4Addr>,
}

impl StoreSink {
    pub fn new(
        graph: GraphClient,
        documents: FileDocumentStore,
        local_address: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            graph,
            documents,
            local_address,
        }
    }

    /// Connect to Neo4j and open the document directory.
    pub async fn connect(
        graph_config: &GraphConfig,
        document_dir: impl AsRef<Path>,
        local_address: Option<Ipv4Addr>,
    ) -> Result<Self, PersistError> {
        let graph = GraphClient::connect(graph_config).await?;
        let documents = FileDocumentStore::new(document_dir.as_ref())?;
        Ok(Self::new(graph, documents, local_address))
    }

    /// Every stored IP with its subnet membership and recorded open ports.
    pub async fn load_topology(&self) -> Result<TopologyView, PersistError> {
        let memberships = self.graph.list_memberships().await?;

        let documents = self.documents.clone();
        let docs = tokio::task::spawn_blocking(move || documents.list())
            .await
            .map_err(|e| PersistError::TaskJoin(e.to_string()))??;

        let open_ports: HashMap<String, Vec<u16>> = docs
            .iter()
            .map(|d| (d.ip_address.to_string(), d.port_numbers()))
            .collect();

        let view = TopologyView::build(&memberships, &open_ports);
        tracing::debug!(
            nodes = view.nodes.len(),
            links = view.links.len(),
            "Topology loaded"
        );
        Ok(view)
    }
}

#[async_trait]
impl TopologySink for StoreSink {
    async fn persist_topology(&self, report: &ScanReport) -> Result<(), PersistError> {
        self.graph.replace_subnet(report, self.local_address).await?;

        let (upserts, removals) = documents_for_report(report);
        let written = upserts.len();
        let documents = self.documents.clone();
        let removed = tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
            for doc in &upserts {
                documents.upsert(doc)?;
            }
            let mut removed = 0;
            for ip in removals {
                if documents.remove(ip)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
        .map_err(|e| PersistError::TaskJoin(e.to_string()))??;

        tracing::info!(
            scan_id = %report.scan_id,
            cidr = %report.subnet.cidr,
            documents_written = written,
            documents_removed = removed,
            "Scan persisted"
        );
        Ok(())
    }
}
