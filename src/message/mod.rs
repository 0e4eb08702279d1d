//! Request and response payloads exchanged between clients and replicas.
//!
//! Every payload starts with a one-byte type tag followed by a
//! type-specific body.

mod request;
mod response;

pub use request::{Request, RequestType, DELIMITER};
pub use response::{Response, ResponseType};
