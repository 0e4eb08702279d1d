//! Cluster-wide definition and endpoint discovery.

mod definition;
mod discovery;

pub use definition::ClusterDefinition;
pub use discovery::{DiscoveryBoard, ServiceDiscovery};
