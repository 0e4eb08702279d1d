//! Endpoint discovery: which socket address serves which replica.

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::ring::ServerNumber;
use crate::utils::PlasmaError;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

/// Lookup contract between clients and whatever publishes replica
/// endpoints.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Endpoint of given replica, if known yet.
    fn lookup(&self, server: ServerNumber) -> Option<SocketAddr>;

    /// Waits until servers `0..count` are all known, or fails after
    /// `timeout`. The default implementation polls every 10ms.
    async fn wait_ready(
        &self,
        count: u8,
        timeout: Duration,
    ) -> Result<(), PlasmaError> {
        let all_known = || (0..count).all(|s| self.lookup(s).is_some());
        time::timeout(timeout, async {
            while !all_known() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| {
            PlasmaError::msg(format!(
                "endpoints of {} servers not known within {:?}",
                count, timeout
            ))
        })
    }
}

struct BoardInner {
    endpoints: RwLock<HashMap<ServerNumber, SocketAddr>>,
    tx_known: watch::Sender<usize>,
}

/// In-process discovery board. Replicas publish their bound address once;
/// clients in the same process read it back. Cloning shares the board.
#[derive(Clone)]
pub struct DiscoveryBoard {
    inner: Arc<BoardInner>,
}

impl DiscoveryBoard {
    pub fn new() -> Self {
        let (tx_known, _) = watch::channel(0);
        DiscoveryBoard {
            inner: Arc::new(BoardInner {
                endpoints: RwLock::new(HashMap::new()),
                tx_known,
            }),
        }
    }

    /// Records the endpoint of `server`. Publishing the same address twice
    /// is harmless; a different address is rejected.
    pub fn publish(
        &self,
        server: ServerNumber,
        addr: SocketAddr,
    ) -> Result<(), PlasmaError> {
        let mut endpoints = self
            .inner
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(known) = endpoints.get(&server) {
            if *known != addr {
                return Err(PlasmaError::msg(format!(
                    "server {} already published at {}",
                    server, known
                )));
            }
            return Ok(());
        }
        endpoints.insert(server, addr);
        self.inner.tx_known.send_replace(endpoints.len());
        Ok(())
    }

    /// Spawns a task that forwards the one-shot port publication of
    /// `server` onto the board.
    pub fn relay(
        &self,
        server: ServerNumber,
        rx_port: oneshot::Receiver<SocketAddr>,
    ) -> JoinHandle<Result<SocketAddr, PlasmaError>> {
        let board = self.clone();
        tokio::spawn(async move {
            let addr = rx_port.await?;
            board.publish(server, addr)?;
            pf_debug!("board"; "server {} at {}", server, addr);
            Ok(addr)
        })
    }

    /// Number of servers published so far.
    pub fn num_known(&self) -> usize {
        *self.inner.tx_known.borrow()
    }

    /// Snapshot of all endpoints, ascending by server number.
    pub fn endpoints(&self) -> Vec<(ServerNumber, SocketAddr)> {
        let endpoints = self
            .inner
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> =
            endpoints.iter().map(|(&s, &addr)| (s, addr)).collect();
        list.sort_unstable();
        list
    }

    /// Parses a ports file: one `"<server> <port>"` line per replica, all
    /// served on `ip`.
    pub fn from_ports_text(text: &str, ip: IpAddr) -> Result<Self, PlasmaError> {
        let board = Self::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let mut fields = line.split_whitespace();
            let (Some(server), Some(port), None) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(PlasmaError::msg(format!(
                    "bad ports line '{}'",
                    line
                )));
            };
            board.publish(server.parse()?, SocketAddr::new(ip, port.parse()?))?;
        }
        Ok(board)
    }

    pub fn load_ports_file(
        path: impl AsRef<Path>,
        ip: IpAddr,
    ) -> Result<Self, PlasmaError> {
        Self::from_ports_text(&fs::read_to_string(path)?, ip)
    }

    /// Renders the board in ports-file format.
    pub fn to_ports_text(&self) -> String {
        self.endpoints()
            .into_iter()
            .map(|(server, addr)| format!("{} {}\n", server, addr.port()))
            .collect()
    }

    pub fn dump_ports_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<(), PlasmaError> {
        fs::write(path, self.to_ports_text())?;
        Ok(())
    }
}

impl Default for DiscoveryBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceDiscovery for DiscoveryBoard {
    fn lookup(&self, server: ServerNumber) -> Option<SocketAddr> {
        self.inner
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&server)
            .copied()
    }

    async fn wait_ready(
        &self,
        count: u8,
        timeout: Duration,
    ) -> Result<(), PlasmaError> {
        let mut rx_known = self.inner.tx_known.subscribe();
        let all_known = async {
            while *rx_known.borrow_and_update() < count as usize {
                rx_known.changed().await?;
            }
            Ok::<(), PlasmaError>(())
        };
        match time::timeout(timeout, all_known).await {
            Ok(result) => result,
            Err(_) => Err(PlasmaError::msg(format!(
                "only {} of {} servers published within {:?}",
                self.num_known(),
                count,
                timeout
            ))),
        }
    }
}
