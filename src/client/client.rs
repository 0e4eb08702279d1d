//! Quorum client: routes each request over the placement ring, fans it out
//! to several replicas, tallies their replies and schedules read-repair.

use std::sync::Arc;

use crate::client::repair::{RepairQueue, RepairWorker, WorkRecord};
use crate::client::tally::Tally;
use crate::client::transport::{exchange_request, TcpTransport, Transport};
use crate::cluster::{ClusterDefinition, ServiceDiscovery};
use crate::message::{Request, Response, ResponseType};
use crate::ring::{slot_hash, PlacementRing, ServerNumber};
use crate::utils::PlasmaError;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};

/// Client identifier, used as logging prefix.
pub type ClientId = u64;

/// Grace period for the repair worker to exit on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Tuning knobs of a client.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Bound on connect, write and read of every exchange.
    pub io_timeout_ms: u64,

    /// Connect attempts beyond the first.
    pub connect_retries: u8,

    /// How long setup waits for every endpoint to be known.
    pub ready_timeout_ms: u64,

    /// Overall deadline of one fan-out.
    pub request_timeout_ms: u64,

    /// Upper bound of the random wait before a failed repair is retried.
    pub repair_jitter_ms: u64,

    /// Pause after a repair while the queue is (nearly) empty.
    pub repair_pacing_ms: u64,

    /// Largest reply payload accepted.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            io_timeout_ms: 2000,
            connect_retries: 2,
            ready_timeout_ms: 10000,
            request_timeout_ms: 5000,
            repair_jitter_ms: 1000,
            repair_pacing_ms: 1000,
            max_frame_len: 4 * 1024 * 1024,
        }
    }
}

type ReplicaReply = (ServerNumber, Result<Response, PlasmaError>);

/// Client of a Plasma cluster. Once constructed it holds the cluster's
/// placement ring and runs its own repair worker.
pub struct QuorumClient {
    id: ClientId,
    tag: String,
    definition: ClusterDefinition,
    config: ClientConfig,
    ring: Arc<PlacementRing>,
    transport: Arc<dyn Transport>,
    repairs: Arc<RepairQueue>,

    tx_term: watch::Sender<bool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl QuorumClient {
    /// Waits until `discovery` knows every replica, then fetches the ring
    /// over TCP and starts the repair worker.
    pub async fn new_and_setup(
        id: ClientId,
        definition: ClusterDefinition,
        discovery: Arc<dyn ServiceDiscovery>,
        config_str: Option<&str>,
    ) -> Result<Self, PlasmaError> {
        let config = Self::parse_config(id, config_str)?;
        discovery
            .wait_ready(
                definition.server_count,
                Duration::from_millis(config.ready_timeout_ms),
            )
            .await?;
        let transport = Arc::new(TcpTransport::new(
            discovery,
            Duration::from_millis(config.io_timeout_ms),
            config.connect_retries,
            config.max_frame_len,
        ));
        Self::setup(id, definition, transport, config).await
    }

    /// Same as `new_and_setup()` over an arbitrary transport.
    pub async fn new_with_transport(
        id: ClientId,
        definition: ClusterDefinition,
        transport: Arc<dyn Transport>,
        config_str: Option<&str>,
    ) -> Result<Self, PlasmaError> {
        let config = Self::parse_config(id, config_str)?;
        Self::setup(id, definition, transport, config).await
    }

    fn parse_config(
        id: ClientId,
        config_str: Option<&str>,
    ) -> Result<ClientConfig, PlasmaError> {
        let config = parsed_config!(config_str => ClientConfig;
                                    io_timeout_ms, connect_retries,
                                    ready_timeout_ms, request_timeout_ms,
                                    repair_jitter_ms, repair_pacing_ms,
                                    max_frame_len)?;
        if config.io_timeout_ms == 0 {
            return logged_err!(format!("c{}", id); "invalid config.io_timeout_ms '0'");
        }
        if config.request_timeout_ms == 0 {
            return logged_err!(format!("c{}", id); "invalid config.request_timeout_ms '0'");
        }
        if config.max_frame_len == 0 {
            return logged_err!(format!("c{}", id); "invalid config.max_frame_len '0'");
        }
        Ok(config)
    }

    async fn setup(
        id: ClientId,
        definition: ClusterDefinition,
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self, PlasmaError> {
        let tag = format!("c{}", id);
        definition.validate()?;
        let ring = Arc::new(
            Self::fetch_ring(&tag, &definition, transport.as_ref(), &config)
                .await?,
        );

        let repairs = Arc::new(RepairQueue::new());
        let (tx_term, rx_term) = watch::channel(false);
        let mut worker = RepairWorker::new(
            tag.clone(),
            repairs.clone(),
            transport.clone(),
            config.repair_jitter_ms,
            Duration::from_millis(config.repair_pacing_ms),
            rx_term,
        );
        let worker_handle = tokio::spawn(async move { worker.run().await });

        pf_info!(tag; "ready, {} routable slots", ring.num_routable());
        Ok(QuorumClient {
            id,
            tag,
            definition,
            config,
            ring,
            transport,
            repairs,
            tx_term,
            worker_handle: Some(worker_handle),
        })
    }

    /// Asks servers in ascending order for the ring until one answers with
    /// a well-formed table.
    async fn fetch_ring(
        tag: &str,
        definition: &ClusterDefinition,
        transport: &dyn Transport,
        config: &ClientConfig,
    ) -> Result<PlacementRing, PlasmaError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        for server in 0..definition.server_count {
            let reply = time::timeout(
                timeout,
                exchange_request(transport, server, &Request::GetState),
            )
            .await
            .map_err(PlasmaError::from)
            .and_then(|reply| reply);
            match reply {
                Ok(response) if response.is_success() => {
                    match PlacementRing::from_state_bytes(
                        definition.server_count,
                        definition.server_copy_count,
                        response.body(),
                    ) {
                        Ok(ring) => return Ok(ring),
                        Err(e) => {
                            pf_warn!(tag; "bad ring from server {}: {}", server, e)
                        }
                    }
                }
                Ok(response) => {
                    pf_warn!(
                        tag;
                        "server {} answered GetState with {:?}",
                        server,
                        response.response_type()
                    )
                }
                Err(e) => {
                    pf_warn!(tag; "GetState to server {} failed: {}", server, e)
                }
            }
        }
        logged_err!(
            tag;
            "no server of {} returned the ring",
            definition.server_count
        )
    }

    #[inline]
    pub fn id(&self) -> ClientId {
        self.id
    }

    #[inline]
    pub fn definition(&self) -> &ClusterDefinition {
        &self.definition
    }

    #[inline]
    pub fn ring(&self) -> &Arc<PlacementRing> {
        &self.ring
    }

    /// Replicas `send()` would contact for `request`. Reads and writes are
    /// placed by their key; other requests by their encoded bytes.
    pub fn targets(
        &self,
        request: &Request,
    ) -> Result<Vec<ServerNumber>, PlasmaError> {
        let start = match request.key() {
            Some(key) => self.ring.route(slot_hash(key))?,
            None => self.ring.route(slot_hash(&request.encode()))?,
        };
        self.ring
            .replicas_for(start, self.definition.client_query_count)
    }

    /// Sends `request` to its `ClientQueryCount` replicas and returns the
    /// winning reply, or a `QuorumFailed` response.
    pub async fn send(
        &self,
        request: &Request,
    ) -> Result<Response, PlasmaError> {
        let targets = self.targets(request)?;
        self.fan_out(
            request,
            &targets,
            self.definition.client_commit_count as usize,
        )
        .await
    }

    /// Sends `request` to `server` alone, bypassing the ring.
    pub async fn send_to(
        &self,
        request: &Request,
        server: ServerNumber,
    ) -> Result<Response, PlasmaError> {
        if server >= self.definition.server_count {
            return logged_err!(
                self.tag;
                "server {} not in cluster of {}",
                server,
                self.definition.server_count
            );
        }
        self.fan_out(request, &[server], 1).await
    }

    async fn fan_out(
        &self,
        request: &Request,
        targets: &[ServerNumber],
        commit_count: usize,
    ) -> Result<Response, PlasmaError> {
        let payload = request.encode();

        // every task exists before any of them sends
        let (tx_start, rx_start) = watch::channel(false);
        let (tx_reply, mut rx_reply) = mpsc::unbounded_channel();
        for &server in targets {
            let transport = self.transport.clone();
            let payload = payload.clone();
            let mut rx_start = rx_start.clone();
            let tx_reply: mpsc::UnboundedSender<ReplicaReply> =
                tx_reply.clone();
            tokio::spawn(async move {
                while !*rx_start.borrow_and_update() {
                    if rx_start.changed().await.is_err() {
                        return;
                    }
                }
                let result = transport
                    .exchange(server, payload)
                    .await
                    .and_then(Response::from_bytes);
                // nobody listens anymore once the caller moved on
                let _ = tx_reply.send((server, result));
            });
        }
        drop(tx_reply);
        tx_start.send_replace(true);

        let deadline = Instant::now()
            + Duration::from_millis(self.config.request_timeout_ms);
        let mut tally = Tally::new();
        let mut num_done = 0;
        while tally.num_replies() < commit_count && num_done < targets.len() {
            match time::timeout_at(deadline, rx_reply.recv()).await {
                Ok(Some(reply)) => {
                    num_done += 1;
                    self.record_reply(&mut tally, reply);
                }
                Ok(None) => break,
                Err(_) => {
                    pf_warn!(
                        self.tag;
                        "{:?} timed out with {} of {} replies",
                        request.request_type(),
                        num_done,
                        targets.len()
                    );
                    break;
                }
            }
        }
        while let Ok(reply) = rx_reply.try_recv() {
            num_done += 1;
            self.record_reply(&mut tally, reply);
        }

        if !tally.passes(commit_count) {
            pf_debug!(
                self.tag;
                "quorum failed for {:?}: {} replies in {} groups",
                request.request_type(),
                tally.num_replies(),
                tally.num_groups()
            );
            return Ok(Response::new(ResponseType::QuorumFailed));
        }
        let Some(winner) = tally.winner().map(|g| g.response.clone()) else {
            return Ok(Response::new(ResponseType::QuorumFailed));
        };
        if tally.is_tied() {
            pf_debug!(self.tag; "tie among {} groups broken by lowest server", tally.num_groups());
        }

        if matches!(request, Request::Read { .. }) && winner.is_success() {
            if tally.num_groups() > 1 {
                for server in tally.stale_servers() {
                    let id = self.repairs.enqueue(
                        request.clone(),
                        server,
                        winner.body_bytes(),
                    );
                    pf_debug!(self.tag; "server {} stale, repair {} queued", server, id);
                }
            }
            if num_done < targets.len() {
                self.watch_stragglers(
                    request.clone(),
                    winner.clone(),
                    rx_reply,
                    deadline,
                );
            }
        }
        Ok(winner)
    }

    fn record_reply(&self, tally: &mut Tally, reply: ReplicaReply) {
        match reply {
            (server, Ok(response)) => tally.add(server, response),
            (server, Err(e)) => {
                pf_debug!(self.tag; "no reply from server {}: {}", server, e)
            }
        }
    }

    /// Keeps listening for replies that arrive after the caller got its
    /// answer; replicas disagreeing with the winner are queued for repair.
    fn watch_stragglers(
        &self,
        request: Request,
        winner: Response,
        mut rx_reply: mpsc::UnboundedReceiver<ReplicaReply>,
        deadline: Instant,
    ) {
        let hold = RepairQueue::hold(&self.repairs);
        let tag = self.tag.clone();
        tokio::spawn(async move {
            while let Ok(Some((server, result))) =
                time::timeout_at(deadline, rx_reply.recv()).await
            {
                match result {
                    Ok(response) if response != winner => {
                        let id = hold.queue().enqueue(
                            request.clone(),
                            server,
                            winner.body_bytes(),
                        );
                        pf_debug!(tag; "late server {} stale, repair {} queued", server, id);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        pf_debug!(tag; "no reply from server {}: {}", server, e)
                    }
                }
            }
            drop(hold);
        });
    }

    /// Number of repairs waiting.
    pub fn repair_backlog(&self) -> usize {
        self.repairs.depth()
    }

    /// True iff no repair is queued, running, or about to be queued.
    pub fn is_drained(&self) -> bool {
        self.repairs.is_drained()
    }

    /// Waits until `is_drained()` holds.
    pub async fn wait_drained(
        &self,
        timeout: Duration,
    ) -> Result<(), PlasmaError> {
        self.repairs.wait_drained(timeout).await
    }

    /// Repairs that exhausted their retries.
    pub fn dead_letters(&self) -> Vec<WorkRecord> {
        self.repairs.dead_letters()
    }

    /// Stops the repair worker and waits for it.
    pub async fn shutdown(&mut self) -> Result<(), PlasmaError> {
        self.tx_term.send_replace(true);
        if let Some(handle) = self.worker_handle.take() {
            match time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(joined) => joined?,
                Err(_) => {
                    return logged_err!(self.tag; "repair worker did not exit in time")
                }
            }
        }
        pf_debug!(self.tag; "shut down");
        Ok(())
    }
}

impl Drop for QuorumClient {
    fn drop(&mut self) {
        self.tx_term.send_replace(true);
    }
}

#[cfg(test)]
mod client_tests {
    use super::*;
    use crate::message::RequestType;
    use crate::server::{DispatchTable, ReplicaContext, Store};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const FAST_REPAIRS: &str = "repair_jitter_ms = 5\n\
                                repair_pacing_ms = 5\n\
                                request_timeout_ms = 2000";

    /// In-process replicas answering through their dispatch tables.
    struct LocalTransport {
        replicas: Vec<ReplicaContext>,
        table: DispatchTable,
        down: Mutex<HashSet<ServerNumber>>,
        reject_writes: Mutex<HashSet<ServerNumber>>,
    }

    impl LocalTransport {
        fn new(definition: &ClusterDefinition) -> Result<Self, PlasmaError> {
            let ring = Arc::new(PlacementRing::new_and_setup(
                definition.server_count,
                definition.server_copy_count,
            )?);
            let replicas = (0..definition.server_count)
                .map(|s| ReplicaContext {
                    tag: format!("s{}", s),
                    store: Store::new(),
                    ring: ring.clone(),
                })
                .collect();
            Ok(LocalTransport {
                replicas,
                table: DispatchTable::new(),
                down: Mutex::new(HashSet::new()),
                reject_writes: Mutex::new(HashSet::new()),
            })
        }

        fn store(&self, server: ServerNumber) -> &Store {
            &self.replicas[server as usize].store
        }

        fn set_down(&self, server: ServerNumber) {
            self.down.lock().unwrap().insert(server);
        }

        fn set_reject_writes(&self, server: ServerNumber) {
            self.reject_writes.lock().unwrap().insert(server);
        }
    }

    #[async_trait]
    impl Transport for LocalTransport {
        async fn exchange(
            &self,
            server: ServerNumber,
            payload: Bytes,
        ) -> Result<Bytes, PlasmaError> {
            if self.down.lock().unwrap().contains(&server) {
                return Err(PlasmaError::msg("connection refused"));
            }
            if payload.first() == Some(&(RequestType::Write as u8))
                && self.reject_writes.lock().unwrap().contains(&server)
            {
                return Err(PlasmaError::msg("connection reset"));
            }
            let ctx = self
                .replicas
                .get(server as usize)
                .ok_or_else(|| PlasmaError::msg("no such server"))?;
            Ok(self.table.dispatch(ctx, &payload).as_bytes().clone())
        }
    }

    async fn setup_client(
        counts: (u8, u8, u8, u8),
    ) -> Result<(QuorumClient, Arc<LocalTransport>), PlasmaError> {
        let definition =
            ClusterDefinition::new(counts.0, counts.1, counts.2, counts.3)?;
        let transport = Arc::new(LocalTransport::new(&definition)?);
        let client = QuorumClient::new_with_transport(
            0,
            definition,
            transport.clone(),
            Some(FAST_REPAIRS),
        )
        .await?;
        Ok((client, transport))
    }

    fn value_of(response: &Response) -> &[u8] {
        assert!(response.is_success(), "{:?}", response);
        response.body()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn write_then_read() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((4, 4, 4, 3)).await?;
        let reply = client.send(&Request::write("a", "1")?).await?;
        assert_eq!(reply, Response::new(ResponseType::Success));
        let reply = client.send(&Request::read("a")?).await?;
        assert_eq!(value_of(&reply), b"1");
        for server in client.targets(&Request::read("a")?)? {
            assert_eq!(transport.store(server).read(b"a"), Some("1".into()));
        }
        assert_eq!(
            client.send(&Request::read("zz")?).await?.response_type(),
            ResponseType::KeyNotFound
        );
        assert_eq!(
            client.send(&Request::Ping).await?.response_type(),
            ResponseType::Ping
        );
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn corrupted_replica_repaired() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((4, 4, 4, 3)).await?;
        client.send(&Request::write("a", "1")?).await?;
        let targets = client.targets(&Request::read("a")?)?;
        assert_eq!(targets.len(), 4);
        let corrupted = targets[2];
        transport.store(corrupted).write("a".into(), "X".into());

        let reply = client.send(&Request::read("a")?).await?;
        assert_eq!(value_of(&reply), b"1");
        client.wait_drained(Duration::from_secs(5)).await?;
        assert_eq!(transport.store(corrupted).read(b"a"), Some("1".into()));
        assert!(client.dead_letters().is_empty());
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn divergence_among_three() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((3, 3, 3, 3)).await?;
        client.send(&Request::write("key0", "v0")?).await?;
        let targets = client.targets(&Request::read("key0")?)?;
        transport.store(targets[0]).write("key0".into(), "bad".into());

        // 2 of 3 agree: commit count missed, majority of groups still holds
        let reply = client.send(&Request::read("key0")?).await?;
        assert_eq!(value_of(&reply), b"v0");
        client.wait_drained(Duration::from_secs(5)).await?;
        for server in targets {
            assert_eq!(
                transport.store(server).read(b"key0"),
                Some("v0".into())
            );
        }
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_copy_repaired() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((3, 3, 3, 3)).await?;
        let targets = client.targets(&Request::read("k")?)?;
        for &server in &targets[..2] {
            transport.store(server).write("k".into(), "v".into());
        }
        let reply = client.send(&Request::read("k")?).await?;
        assert_eq!(value_of(&reply), b"v");
        client.wait_drained(Duration::from_secs(5)).await?;
        assert_eq!(transport.store(targets[2]).read(b"k"), Some("v".into()));
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn split_pair_fails_quorum() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((2, 2, 2, 2)).await?;
        client.send(&Request::write("k", "1")?).await?;
        let targets = client.targets(&Request::read("k")?)?;
        transport.store(targets[1]).write("k".into(), "X".into());

        let reply = client.send(&Request::read("k")?).await?;
        assert_eq!(reply.response_type(), ResponseType::QuorumFailed);
        assert!(client.is_drained());
        assert_eq!(transport.store(targets[1]).read(b"k"), Some("X".into()));
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_read_never_repairs() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((5, 5, 5, 5)).await?;
        client.send(&Request::write("k", "1")?).await?;
        let targets = client.targets(&Request::read("k")?)?;
        for (&server, value) in targets[2..].iter().zip(["X", "Y", "Z"]) {
            transport.store(server).write("k".into(), value.into());
        }

        // one group of two against three singles: largest group is unique
        // but short of quorum
        let reply = client.send(&Request::read("k")?).await?;
        assert_eq!(reply.response_type(), ResponseType::QuorumFailed);
        assert!(client.is_drained());
        assert_eq!(client.repair_backlog(), 0);
        assert_eq!(transport.store(targets[2]).read(b"k"), Some("X".into()));
        assert_eq!(transport.store(targets[4]).read(b"k"), Some("Z".into()));
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tolerate_unreachable_replicas() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((4, 4, 4, 3)).await?;
        client.send(&Request::write("a", "1")?).await?;
        let targets = client.targets(&Request::read("a")?)?;

        transport.set_down(targets[0]);
        let reply = client.send(&Request::read("a")?).await?;
        assert_eq!(value_of(&reply), b"1");

        transport.set_down(targets[1]);
        let reply = client.send(&Request::read("a")?).await?;
        assert_eq!(value_of(&reply), b"1");

        transport.set_down(targets[2]);
        transport.set_down(targets[3]);
        let reply = client.send(&Request::read("a")?).await?;
        assert_eq!(reply.response_type(), ResponseType::QuorumFailed);
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unrepairable_goes_dead_letter() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((3, 3, 3, 3)).await?;
        client.send(&Request::write("k", "good")?).await?;
        let targets = client.targets(&Request::read("k")?)?;
        let stuck = targets[1];
        transport.store(stuck).write("k".into(), "bad".into());
        transport.set_reject_writes(stuck);

        let reply = client.send(&Request::read("k")?).await?;
        assert_eq!(value_of(&reply), b"good");
        client.wait_drained(Duration::from_secs(10)).await?;
        let dead = client.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].stale_server(), stuck);
        assert_eq!(dead[0].value(), &Bytes::from("good"));
        assert_eq!(transport.store(stuck).read(b"k"), Some("bad".into()));
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn targets_are_deterministic() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((6, 3, 3, 2)).await?;
        let other = QuorumClient::new_with_transport(
            1,
            client.definition().clone(),
            transport.clone(),
            None,
        )
        .await?;
        for key in ["a", "b", "key0", "key1", "longer key"] {
            let request = Request::read(key)?;
            let targets = client.targets(&request)?;
            assert_eq!(targets, other.targets(&request)?);
            let mut distinct = targets.clone();
            distinct.sort_unstable();
            distinct.dedup();
            assert_eq!(distinct.len(), 3);
            // the value being written does not move the key
            assert_eq!(
                targets,
                client.targets(&Request::write(key, "anything")?)?
            );
        }
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn direct_send() -> Result<(), PlasmaError> {
        let (mut client, transport) = setup_client((3, 3, 3, 2)).await?;
        let reply = client.send_to(&Request::GetState, 2).await?;
        assert_eq!(reply.body(), &client.ring().to_state_bytes()[..]);
        client.send_to(&Request::write("solo", "1")?, 1).await?;
        assert_eq!(transport.store(1).read(b"solo"), Some("1".into()));
        assert_eq!(transport.store(0).read(b"solo"), None);
        assert!(client.send_to(&Request::Ping, 3).await.is_err());
        client.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bootstrap_skips_dead_servers() -> Result<(), PlasmaError> {
        let definition = ClusterDefinition::new(3, 3, 3, 2)?;
        let transport = Arc::new(LocalTransport::new(&definition)?);
        transport.set_down(0);
        let mut client = QuorumClient::new_with_transport(
            0,
            definition.clone(),
            transport.clone(),
            None,
        )
        .await?;
        client.shutdown().await?;

        transport.set_down(1);
        transport.set_down(2);
        assert!(QuorumClient::new_with_transport(0, definition, transport, None)
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_client_config() -> Result<(), PlasmaError> {
        let definition = ClusterDefinition::new(1, 1, 1, 1)?;
        let transport = Arc::new(LocalTransport::new(&definition)?);
        assert!(QuorumClient::new_with_transport(
            0,
            definition.clone(),
            transport.clone(),
            Some("request_timeout_ms = 0"),
        )
        .await
        .is_err());
        assert!(QuorumClient::new_with_transport(
            0,
            definition.clone(),
            transport.clone(),
            Some("max_frame_len = 0"),
        )
        .await
        .is_err());
        assert!(QuorumClient::new_with_transport(
            0,
            definition,
            transport,
            Some("unknown_knob = 1"),
        )
        .await
        .is_err());
        Ok(())
    }
}
