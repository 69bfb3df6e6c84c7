//! Bolt connection pool for the topology graph.

use neo4rs::{ConfigBuilder, Graph, Query, Row, Txn};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Cannot reach Neo4j at {uri}: {message}")]
    Unreachable { uri: String, message: String },

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Failed to read column {column}: {message}")]
    Deserialize { column: String, message: String },
}

/// Where the topology graph lives and how many sessions to pool.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    /// Empty unless set through `neo4j.password`.
    pub password: String,
    pub max_connections: u32,
    /// Rows pulled per round trip when streaming a result.
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

impl GraphConfig {
    fn unreachable(&self, message: impl ToString) -> GraphError {
        GraphError::Unreachable {
            uri: self.uri.clone(),
            message: message.to_string(),
        }
    }

    fn bolt_config(&self) -> Result<neo4rs::Config, GraphError> {
        ConfigBuilder::default()
            .uri(self.uri.as_str())
            .user(self.user.as_str())
            .password(self.password.as_str())
            .max_connections(self.max_connections as usize)
            .fetch_size(self.fetch_size)
            .build()
            .map_err(|e| self.unreachable(e))
    }
}

/// Pooled handle to the topology graph. Clones share one pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let graph = Graph::connect(config.bolt_config()?)
            .await
            .map_err(|e| config.unreachable(e))?;

        tracing::debug!(
            uri = %config.uri,
            max_connections = config.max_connections,
            "Neo4j pool ready"
        );
        Ok(Self { graph })
    }

    /// Every row of a read query.
    pub(crate) async fn rows(&self, query: Query) -> Result<Vec<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// The first row of a read query; the rest of the stream is dropped.
    pub(crate) async fn first_row(&self, query: Query) -> Result<Option<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Open a transaction. Nothing is written unless the caller commits.
    pub(crate) async fn transaction(&self) -> Result<Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}
