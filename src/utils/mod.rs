//! Helper utilities, functions, and macros.

#[macro_use]
mod print;

#[macro_use]
mod config;

mod bitmap;
mod error;
mod framing;
mod timer;

pub use error::PlasmaError;
pub use print::logger_init;

pub(crate) use bitmap::Bitmap;
pub(crate) use framing::{
    read_frame, tcp_bind_with_retry, tcp_connect_with_retry, write_frame,
    FRAME_HEADER_LEN,
};
pub(crate) use timer::Timer;
