//! Client side: transport, quorum fan-out and background read-repair.

mod client;
mod repair;
mod tally;
mod transport;

pub use client::{ClientConfig, ClientId, QuorumClient};
pub use repair::{pacing_delay, WorkRecord, WorkState, MAX_REPAIR_RETRIES};
pub use transport::{TcpTransport, Transport};
