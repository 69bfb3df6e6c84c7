//! lanscape-core: Shared value types for the lanscape subnet mapper.
//!
//! This crate provides the types passed between the scan engine and the stores:
//! - Scan entities (Subnet, Address, OpenPort) and the immutable ScanReport
//! - The node/link topology view served to the visualization UI

pub mod topology;
pub mod types;

pub use topology::{Membership, NodeKind, TopologyLink, TopologyNode, TopologyView};
pub use types::{Address, AddressStatus, OpenPort, ScanReport, Subnet};
