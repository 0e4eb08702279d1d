//! Crate-wide unified error type.

use std::array;
use std::error;
use std::fmt;
use std::io;
use std::net;
use std::num;
use std::str;
use std::string;

/// Error type shared by every Plasma component.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PlasmaError(String);

impl PlasmaError {
    pub fn msg(msg: impl ToString) -> Self {
        PlasmaError(msg.to_string())
    }
}

impl fmt::Display for PlasmaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for PlasmaError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `PlasmaError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for PlasmaError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                PlasmaError(e.to_string())
            }
        }
    };
}

// Same as above, for generic error types carrying the unsent value.
macro_rules! impl_from_error_generic {
    ($error:ty) => {
        impl<T> From<$error> for PlasmaError {
            fn from(e: $error) -> PlasmaError {
                PlasmaError::msg(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(string::FromUtf8Error);
impl_from_error!(str::Utf8Error);
impl_from_error!(num::ParseIntError);
impl_from_error!(num::TryFromIntError);
impl_from_error!(array::TryFromSliceError);
impl_from_error!(net::AddrParseError);
impl_from_error!(toml::de::Error);
impl_from_error!(ctrlc::Error);
impl_from_error!(tokio::time::error::Elapsed);
impl_from_error!(tokio::task::JoinError);
impl_from_error!(tokio::sync::oneshot::error::RecvError);
impl_from_error!(tokio::sync::watch::error::RecvError);

impl_from_error_generic!(tokio::sync::watch::error::SendError<T>);
impl_from_error_generic!(tokio::sync::mpsc::error::SendError<T>);

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = PlasmaError("what the heck?".into());
        assert_eq!(format!("{}", e), String::from("what the heck?"));
    }

    #[test]
    fn from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "oh no!");
        let e = PlasmaError::from(io_error);
        assert!(e.0.contains("oh no!"));
    }

    #[test]
    fn from_parse_error() {
        let e = PlasmaError::from("x7".parse::<u8>().unwrap_err());
        assert!(e.to_string().contains("invalid digit"));
    }
}
