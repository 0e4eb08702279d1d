//! Client-to-replica requests.

use crate::utils::PlasmaError;

use bytes::{BufMut, Bytes, BytesMut};

/// Separator between key and value in a write body.
pub const DELIMITER: u8 = b',';

/// Request type tag, the first payload byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Ping = 1,
    Start = 2,
    Stop = 3,
    Read = 4,
    Write = 5,
    GetState = 6,
}

impl TryFrom<u8> for RequestType {
    type Error = PlasmaError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(RequestType::Ping),
            2 => Ok(RequestType::Start),
            3 => Ok(RequestType::Stop),
            4 => Ok(RequestType::Read),
            5 => Ok(RequestType::Write),
            6 => Ok(RequestType::GetState),
            _ => Err(PlasmaError::msg(format!("unknown request type {}", tag))),
        }
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    Start,
    Stop,
    Read { key: Bytes },
    Write { key: Bytes, value: Bytes },
    GetState,
}

fn check_key(key: &[u8]) -> Result<(), PlasmaError> {
    if key.is_empty() {
        return Err(PlasmaError::msg("key must not be empty"));
    }
    if key.contains(&DELIMITER) {
        return Err(PlasmaError::msg(format!(
            "key '{}' contains the delimiter",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(())
}

impl Request {
    /// Builds a read of `key`.
    pub fn read(key: impl AsRef<[u8]>) -> Result<Self, PlasmaError> {
        let key = key.as_ref();
        check_key(key)?;
        Ok(Request::Read {
            key: Bytes::copy_from_slice(key),
        })
    }

    /// Builds a write of `value` under `key`. The value may contain any
    /// bytes, including the delimiter.
    pub fn write(
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<Self, PlasmaError> {
        let key = key.as_ref();
        check_key(key)?;
        Ok(Request::Write {
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value.as_ref()),
        })
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Request::Ping => RequestType::Ping,
            Request::Start => RequestType::Start,
            Request::Stop => RequestType::Stop,
            Request::Read { .. } => RequestType::Read,
            Request::Write { .. } => RequestType::Write,
            Request::GetState => RequestType::GetState,
        }
    }

    /// Key carried by reads and writes.
    pub fn key(&self) -> Option<&Bytes> {
        match self {
            Request::Read { key } | Request::Write { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.body_len());
        buf.put_u8(self.request_type() as u8);
        match self {
            Request::Read { key } => buf.put_slice(key),
            Request::Write { key, value } => {
                buf.put_slice(key);
                buf.put_u8(DELIMITER);
                buf.put_slice(value);
            }
            _ => {}
        }
        buf.freeze()
    }

    fn body_len(&self) -> usize {
        match self {
            Request::Read { key } => key.len(),
            Request::Write { key, value } => key.len() + 1 + value.len(),
            _ => 0,
        }
    }

    /// Parses a payload received by a replica. Bodies of body-less request
    /// types are ignored.
    pub fn decode(payload: &[u8]) -> Result<Self, PlasmaError> {
        let (&tag, body) = payload
            .split_first()
            .ok_or_else(|| PlasmaError::msg("empty request payload"))?;
        match RequestType::try_from(tag)? {
            RequestType::Ping => Ok(Request::Ping),
            RequestType::Start => Ok(Request::Start),
            RequestType::Stop => Ok(Request::Stop),
            RequestType::GetState => Ok(Request::GetState),
            RequestType::Read => {
                if body.is_empty() {
                    return Err(PlasmaError::msg("read without key"));
                }
                Ok(Request::Read {
                    key: Bytes::copy_from_slice(body),
                })
            }
            RequestType::Write => {
                let split = body
                    .iter()
                    .position(|&b| b == DELIMITER)
                    .ok_or_else(|| {
                        PlasmaError::msg("write body without delimiter")
                    })?;
                if split == 0 {
                    return Err(PlasmaError::msg("write without key"));
                }
                Ok(Request::Write {
                    key: Bytes::copy_from_slice(&body[..split]),
                    value: Bytes::copy_from_slice(&body[split + 1..]),
                })
            }
        }
    }
}
