//! Replica side: store, request dispatch, and the TCP server.

mod dispatch;
mod launcher;
mod replica;
mod store;

pub use launcher::ReplicaCluster;
pub use replica::{ReplicaConfig, ReplicaServer};
pub use store::Store;

#[cfg(test)]
pub(crate) use dispatch::{DispatchTable, ReplicaContext};
