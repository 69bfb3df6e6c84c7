//! lanscape-discover: Concurrent subnet scanner for the lanscape topology map.
//!
//! Expands a CIDR into host addresses, finds which ones answer, probes a
//! table of TCP ports on the live ones, and hands the resulting report to
//! the Neo4j graph and the port document store.

pub mod api;
pub mod assemble;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod local;
pub mod persist;
pub mod ports;
pub mod probe;
pub mod range;
pub mod scanner;

pub use error::{DiscoverError, Result};
pub use scanner::{ScanOptions, SubnetScanner};
