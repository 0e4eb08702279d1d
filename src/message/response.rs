//! Replica-to-client (and client-to-caller) responses.

use std::fmt;

use crate::utils::PlasmaError;

use bytes::{BufMut, Bytes, BytesMut};

/// Response type tag, the first payload byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Invalid = 0,
    Ping = 1,
    NoBytesReceived = 2,
    CouldNotProcessCommand = 3,
    Started = 4,
    Stopped = 5,
    Success = 6,
    KeyNotFound = 7,
    QuorumFailed = 8,
}

impl From<u8> for ResponseType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => ResponseType::Ping,
            2 => ResponseType::NoBytesReceived,
            3 => ResponseType::CouldNotProcessCommand,
            4 => ResponseType::Started,
            5 => ResponseType::Stopped,
            6 => ResponseType::Success,
            7 => ResponseType::KeyNotFound,
            8 => ResponseType::QuorumFailed,
            _ => ResponseType::Invalid,
        }
    }
}

/// An encoded response. Two responses are equal iff their bytes are, which
/// is what the quorum tally groups on.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Response {
    bytes: Bytes,
}

impl Response {
    /// A response with no body.
    pub fn new(kind: ResponseType) -> Self {
        Response {
            bytes: Bytes::copy_from_slice(&[kind as u8]),
        }
    }

    pub fn with_body(kind: ResponseType, body: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(kind as u8);
        buf.put_slice(body);
        Response {
            bytes: buf.freeze(),
        }
    }

    /// Wraps bytes received off the wire.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, PlasmaError> {
        if bytes.is_empty() {
            return Err(PlasmaError::msg("empty response payload"));
        }
        Ok(Response { bytes })
    }

    #[inline]
    pub fn response_type(&self) -> ResponseType {
        ResponseType::from(self.bytes[0])
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.response_type() == ResponseType::Success
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.bytes[1..]
    }

    /// Body without the tag, sharing the underlying buffer.
    pub fn body_bytes(&self) -> Bytes {
        self.bytes.slice(1..)
    }

    #[inline]
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Short human-readable rendering used by the interactive client.
    pub fn describe(&self) -> String {
        match self.response_type() {
            ResponseType::Invalid => "invalid response".into(),
            ResponseType::Ping => "ping success".into(),
            ResponseType::NoBytesReceived => "no bytes received".into(),
            ResponseType::CouldNotProcessCommand => {
                "could not process command".into()
            }
            ResponseType::Started => "successfully started".into(),
            ResponseType::Stopped => "successfully stopped".into(),
            ResponseType::Success if self.body().is_empty() => {
                "successful".into()
            }
            ResponseType::Success => {
                String::from_utf8_lossy(self.body()).into_owned()
            }
            ResponseType::KeyNotFound => "key not found".into(),
            ResponseType::QuorumFailed => "quorum failed".into(),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Response({:?}, {} body bytes)",
            self.response_type(),
            self.body().len()
        )
    }
}
