//! lanscape-graph: Neo4j client for the subnet topology graph.
//!
//! The graph holds one `Subnet` node per scanned network, one `IP` node per
//! usable address (`BELONGS_TO` its subnet), and `Host`/`Interface` nodes for
//! addresses that answered. All graph reads and writes go through this crate.

pub mod client;
pub mod mutations;
pub mod queries;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use queries::SubnetRecord;
