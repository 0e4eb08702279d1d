//! Plasma: a key-value store replicated over a fixed ring of placement
//! slots, with quorum-voted client operations and background read-repair.

#[macro_use]
mod utils;

mod client;
mod cluster;
mod message;
mod ring;
mod server;

pub use utils::{logger_init, PlasmaError};

pub use ring::{
    next_copy_slot, slot_hash, PlacementRing, ServerNumber, Slot, SlotIndex,
    MAX_COPY_COUNT, MAX_SERVER_COUNT, SERVER_NUMBER_SHUNT,
    SERVER_NUMBER_UNFILLED, SLOT_COUNT,
};

pub use message::{Request, RequestType, Response, ResponseType, DELIMITER};

pub use cluster::{ClusterDefinition, DiscoveryBoard, ServiceDiscovery};

pub use server::{ReplicaCluster, ReplicaConfig, ReplicaServer, Store};

pub use client::{
    pacing_delay, ClientConfig, ClientId, QuorumClient, TcpTransport,
    Transport, WorkRecord, WorkState, MAX_REPAIR_RETRIES,
};
