//! Cluster definition loaded once from a `Key=Value` file.

use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use crate::ring::{ServerNumber, MAX_COPY_COUNT, MAX_SERVER_COUNT};
use crate::utils::PlasmaError;

/// Immutable description of a cluster: how many replicas, how many copies
/// of each key, and the quorum sizes used by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDefinition {
    pub server_count: u8,
    pub server_copy_count: u8,
    pub server_commit_count: u8,
    pub client_query_count: u8,
    pub client_commit_count: u8,

    // background sync knobs, carried but unused
    pub slot_push_period: u32,
    pub slot_push_trigger_count: u32,
    pub server_commit_period: u32,
    pub server_commit_trigger_count: u32,

    /// Address replicas bind to.
    pub ip_address: IpAddr,

    /// Base port; replica `i` binds `port + i`. Zero picks ephemeral ports.
    pub port: u16,
}

impl ClusterDefinition {
    /// Creates a definition with the given counts and defaults elsewhere.
    pub fn new(
        server_count: u8,
        server_copy_count: u8,
        client_query_count: u8,
        client_commit_count: u8,
    ) -> Result<Self, PlasmaError> {
        let definition = ClusterDefinition {
            server_count,
            server_copy_count,
            server_commit_count: 1,
            client_query_count,
            client_commit_count,
            slot_push_period: 0,
            slot_push_trigger_count: 0,
            server_commit_period: 0,
            server_commit_trigger_count: 0,
            ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Reads and parses a definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlasmaError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PlasmaError::msg(format!(
                "cannot read definition '{}': {}",
                path.display(),
                e
            ))
        })?;
        text.parse()
    }

    /// Checks every count against its allowed range.
    pub fn validate(&self) -> Result<(), PlasmaError> {
        let check = |name: &str, value: u8, max: u8| {
            if value == 0 || value > max {
                Err(PlasmaError::msg(format!(
                    "{} must be in 1..={}, got {}",
                    name, max, value
                )))
            } else {
                Ok(())
            }
        };
        check("ServerCount", self.server_count, MAX_SERVER_COUNT)?;
        check(
            "ServerCopyCount",
            self.server_copy_count,
            MAX_COPY_COUNT.min(self.server_count),
        )?;
        check(
            "ServerCommitCount",
            self.server_commit_count,
            self.server_copy_count,
        )?;
        check(
            "ClientQueryCount",
            self.client_query_count,
            self.server_copy_count,
        )?;
        check(
            "ClientCommitCount",
            self.client_commit_count,
            self.client_query_count,
        )?;
        if self.port != 0
            && self.port as u32 + self.server_count as u32 - 1 > u16::MAX as u32
        {
            return Err(PlasmaError::msg(format!(
                "Port {} leaves no room for {} servers",
                self.port, self.server_count
            )));
        }
        Ok(())
    }

    /// Address replica `server` binds to.
    pub fn bind_addr(&self, server: ServerNumber) -> SocketAddr {
        let port = if self.port == 0 {
            0
        } else {
            self.port.saturating_add(server as u16)
        };
        SocketAddr::new(self.ip_address, port)
    }
}

fn parse_count<T: FromStr>(key: &str, value: &str) -> Result<T, PlasmaError> {
    value.parse::<T>().map_err(|_| {
        PlasmaError::msg(format!("invalid value '{}' for {}", value, key))
    })
}

impl FromStr for ClusterDefinition {
    type Err = PlasmaError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut server_count = None;
        let mut server_copy_count = None;
        let mut client_query_count = None;
        let mut client_commit_count = None;
        let mut definition = ClusterDefinition {
            server_count: 1,
            server_copy_count: 1,
            server_commit_count: 1,
            client_query_count: 1,
            client_commit_count: 1,
            slot_push_period: 0,
            slot_push_trigger_count: 0,
            server_commit_period: 0,
            server_commit_trigger_count: 0,
            ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        };

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                PlasmaError::msg(format!(
                    "line {}: expected Key=Value, got '{}'",
                    lineno + 1,
                    line
                ))
            })?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "ServerCount" => server_count = Some(parse_count(key, value)?),
                "ServerCopyCount" => {
                    server_copy_count = Some(parse_count(key, value)?)
                }
                "ServerCommitCount" => {
                    definition.server_commit_count = parse_count(key, value)?
                }
                "ClientQueryCount" => {
                    client_query_count = Some(parse_count(key, value)?)
                }
                "ClientCommitCount" => {
                    client_commit_count = Some(parse_count(key, value)?)
                }
                "SlotPushPeriod" => {
                    definition.slot_push_period = parse_count(key, value)?
                }
                "SlotPushTriggerCount" => {
                    definition.slot_push_trigger_count =
                        parse_count(key, value)?
                }
                "ServerCommitPeriod" => {
                    definition.server_commit_period = parse_count(key, value)?
                }
                "ServerCommitTriggerCount" => {
                    definition.server_commit_trigger_count =
                        parse_count(key, value)?
                }
                "IpAddress" => definition.ip_address = value.parse()?,
                "Port" => definition.port = parse_count(key, value)?,
                "" => {
                    return Err(PlasmaError::msg(format!(
                        "line {}: empty key",
                        lineno + 1
                    )))
                }
                _ => {
                    return Err(PlasmaError::msg(format!(
                        "line {}: unknown key '{}'",
                        lineno + 1,
                        key
                    )))
                }
            }
        }

        let require = |name: &str, value: Option<u8>| {
            value.ok_or_else(|| PlasmaError::msg(format!("missing {}", name)))
        };
        definition.server_count = require("ServerCount", server_count)?;
        definition.server_copy_count =
            require("ServerCopyCount", server_copy_count)?;
        definition.client_query_count =
            require("ClientQueryCount", client_query_count)?;
        definition.client_commit_count =
            require("ClientCommitCount", client_commit_count)?;
        definition.validate()?;
        Ok(definition)
    }
}

// Writes the same format `from_str` reads.
impl fmt::Display for ClusterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "ServerCount={}", self.server_count)?;
        writeln!(f, "ServerCopyCount={}", self.server_copy_count)?;
        writeln!(f, "ServerCommitCount={}", self.server_commit_count)?;
        writeln!(f, "ClientQueryCount={}", self.client_query_count)?;
        writeln!(f, "ClientCommitCount={}", self.client_commit_count)?;
        writeln!(f, "SlotPushPeriod={}", self.slot_push_period)?;
        writeln!(f, "SlotPushTriggerCount={}", self.slot_push_trigger_count)?;
        writeln!(f, "ServerCommitPeriod={}", self.server_commit_period)?;
        writeln!(
            f,
            "ServerCommitTriggerCount={}",
            self.server_commit_trigger_count
        )?;
        writeln!(f, "IpAddress={}", self.ip_address)?;
        writeln!(f, "Port={}", self.port)
    }
}

#[cfg(test)]
mod definition_tests {
    use super::*;

    #[test]
    fn parse_minimal() -> Result<(), PlasmaError> {
        let definition: ClusterDefinition = "ServerCount=4\n\
             ServerCopyCount=4\n\
             ClientQueryCount=4\n\
             ClientCommitCount=3\n"
            .parse()?;
        assert_eq!(definition, ClusterDefinition::new(4, 4, 4, 3)?);
        assert_eq!(definition.bind_addr(2).port(), 0);
        Ok(())
    }

    #[test]
    fn parse_full_with_comments() -> Result<(), PlasmaError> {
        let text = "# three replicas on fixed ports\n\
                    \n\
                    ServerCount = 3\n\
                    ServerCopyCount=3\n\
                    ServerCommitCount=2\n\
                    ClientQueryCount=3\n\
                    ClientCommitCount=2\n\
                    SlotPushPeriod=500\n\
                    IpAddress=0.0.0.0\n\
                    Port=7000\n";
        let definition: ClusterDefinition = text.parse()?;
        assert_eq!(definition.server_commit_count, 2);
        assert_eq!(definition.slot_push_period, 500);
        assert_eq!(
            definition.bind_addr(2),
            "0.0.0.0:7002".parse::<SocketAddr>()?
        );
        Ok(())
    }

    #[test]
    fn display_reparses() -> Result<(), PlasmaError> {
        let mut definition = ClusterDefinition::new(5, 3, 3, 2)?;
        definition.port = 9100;
        let reparsed: ClusterDefinition = definition.to_string().parse()?;
        assert_eq!(reparsed, definition);
        Ok(())
    }

    #[test]
    fn parse_errors() {
        let cases = [
            "ServerCount 4",
            "ServerCount=4\nServerCopyCount=4\nClientQueryCount=4",
            "ServerCount=4\nServerCopyCount=4\nClientQueryCount=4\n\
             ClientCommitCount=3\nColour=blue",
            "=4",
            "ServerCount=four",
            "ServerCount=0\nServerCopyCount=1\nClientQueryCount=1\n\
             ClientCommitCount=1",
            "ServerCount=255\nServerCopyCount=1\nClientQueryCount=1\n\
             ClientCommitCount=1",
            "ServerCount=3\nServerCopyCount=4\nClientQueryCount=3\n\
             ClientCommitCount=3",
            "ServerCount=9\nServerCopyCount=9\nClientQueryCount=3\n\
             ClientCommitCount=3",
            "ServerCount=3\nServerCopyCount=3\nClientQueryCount=2\n\
             ClientCommitCount=3",
            "ServerCount=3\nServerCopyCount=3\nClientQueryCount=3\n\
             ClientCommitCount=3\nPort=65535",
        ];
        for text in cases {
            assert!(text.parse::<ClusterDefinition>().is_err(), "{}", text);
        }
    }
}
