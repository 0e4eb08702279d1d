//! Replica server: accept loop and per-connection request handling.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::message::ResponseType;
use crate::ring::{PlacementRing, ServerNumber};
use crate::server::dispatch::{DispatchTable, ReplicaContext};
use crate::server::Store;
use crate::utils::{
    read_frame, tcp_bind_with_retry, write_frame, PlasmaError,
    FRAME_HEADER_LEN,
};

use bytes::BytesMut;
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

/// Grace period for the accept loop to exit on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Tuning knobs of a replica.
#[derive(Debug, Deserialize, Clone)]
pub struct ReplicaConfig {
    /// Bound on every socket read and write of a connection.
    pub io_timeout_ms: u64,

    /// Largest request payload accepted.
    pub max_frame_len: usize,

    /// Bind attempts beyond the first.
    pub bind_retries: u8,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        ReplicaConfig {
            io_timeout_ms: 5000,
            max_frame_len: 4 * 1024 * 1024,
            bind_retries: 10,
        }
    }
}

/// One replica of the cluster, serving requests on its own TCP endpoint.
pub struct ReplicaServer {
    me: ServerNumber,
    tag: String,
    local_addr: SocketAddr,
    store: Store,

    /// Setting true ends the accept loop.
    tx_term: Arc<watch::Sender<bool>>,

    acceptor_handle: Option<JoinHandle<()>>,
}

impl ReplicaServer {
    /// Binds `bind_addr`, publishes the bound address once on `tx_port` and
    /// spawns the accept loop.
    pub async fn new_and_setup(
        me: ServerNumber,
        bind_addr: SocketAddr,
        ring: Arc<PlacementRing>,
        tx_port: oneshot::Sender<SocketAddr>,
        config_str: Option<&str>,
    ) -> Result<Self, PlasmaError> {
        let tag = format!("s{}", me);
        let config = parsed_config!(config_str => ReplicaConfig;
                                    io_timeout_ms, max_frame_len,
                                    bind_retries)?;
        if config.io_timeout_ms == 0 {
            return logged_err!(tag; "invalid config.io_timeout_ms '0'");
        }
        if config.max_frame_len == 0 {
            return logged_err!(tag; "invalid config.max_frame_len '0'");
        }

        let listener = tcp_bind_with_retry(
            bind_addr,
            config.bind_retries,
            Duration::from_secs(1),
        )
        .await?;
        let local_addr = listener.local_addr()?;
        if tx_port.send(local_addr).is_err() {
            pf_warn!(tag; "nobody listening for port publication");
        }

        let store = Store::new();
        let (tx_term, rx_term) = watch::channel(false);
        let tx_term = Arc::new(tx_term);
        let mut acceptor = ReplicaAcceptorTask {
            tag: tag.clone(),
            listener,
            ctx: Arc::new(ReplicaContext {
                tag: tag.clone(),
                store: store.clone(),
                ring,
            }),
            dispatch: Arc::new(DispatchTable::new()),
            config,
            tx_term: tx_term.clone(),
            rx_term,
        };
        let acceptor_handle = tokio::spawn(async move { acceptor.run().await });

        Ok(ReplicaServer {
            me,
            tag,
            local_addr,
            store,
            tx_term,
            acceptor_handle: Some(acceptor_handle),
        })
    }

    #[inline]
    pub fn me(&self) -> ServerNumber {
        self.me
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle onto this replica's store.
    #[inline]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// True until the accept loop has exited.
    pub fn is_running(&self) -> bool {
        self.acceptor_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Waits until the accept loop exits, e.g. after a `Stop` request.
    pub async fn wait_stopped(&mut self) -> Result<(), PlasmaError> {
        if let Some(handle) = self.acceptor_handle.as_mut() {
            handle.await?;
            self.acceptor_handle = None;
        }
        Ok(())
    }

    /// Ends the accept loop and waits for it.
    pub async fn shutdown(&mut self) -> Result<(), PlasmaError> {
        self.tx_term.send_replace(true);
        if let Some(handle) = self.acceptor_handle.take() {
            if time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                return logged_err!(self.tag; "accept loop did not exit in time");
            }
        }
        Ok(())
    }
}

impl Drop for ReplicaServer {
    fn drop(&mut self) {
        self.tx_term.send_replace(true);
    }
}

/// ReplicaServer accept loop task.
struct ReplicaAcceptorTask {
    tag: String,
    listener: TcpListener,
    ctx: Arc<ReplicaContext>,
    dispatch: Arc<DispatchTable>,
    config: ReplicaConfig,
    tx_term: Arc<watch::Sender<bool>>,
    rx_term: watch::Receiver<bool>,
}

impl ReplicaAcceptorTask {
    async fn run(&mut self) {
        pf_info!(
            self.tag;
            "accepting requests on '{}'",
            self.listener
                .local_addr()
                .map_or("?".into(), |addr| addr.to_string())
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            pf_warn!(self.tag; "error accepting connection: {}", e);
                            continue;
                        }
                    };
                    let ctx = self.ctx.clone();
                    let dispatch = self.dispatch.clone();
                    let config = self.config.clone();
                    let tx_term = self.tx_term.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(
                            stream, &ctx, &dispatch, &config, &tx_term
                        ).await {
                            pf_debug!(ctx.tag; "connection from '{}' dropped: {}", addr, e);
                        }
                    });
                },

                changed = self.rx_term.changed() => {
                    if changed.is_err() || *self.rx_term.borrow() {
                        break;
                    }
                },
            }
        }

        pf_info!(self.tag; "accept loop exited");
    }
}

/// Serves exactly one request/response exchange on `stream`.
async fn serve_connection(
    mut stream: TcpStream,
    ctx: &ReplicaContext,
    dispatch: &DispatchTable,
    config: &ReplicaConfig,
    tx_term: &watch::Sender<bool>,
) -> Result<(), PlasmaError> {
    let io_timeout = Duration::from_millis(config.io_timeout_ms);
    stream.set_nodelay(true)?;
    let (mut conn_read, mut conn_write) = stream.split();

    let mut read_buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 1024);
    let payload = time::timeout(
        io_timeout,
        read_frame(&mut read_buf, &mut conn_read, config.max_frame_len),
    )
    .await??;

    let response = dispatch.dispatch(ctx, &payload);
    time::timeout(io_timeout, write_frame(&mut conn_write, response.as_bytes()))
        .await??;

    if response.response_type() == ResponseType::Stopped {
        tx_term.send_replace(true);
    }
    Ok(())
}
