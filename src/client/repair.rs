//! Read-repair queue and its background worker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::client::transport::{exchange_request, Transport};
use crate::message::Request;
use crate::ring::ServerNumber;
use crate::utils::{PlasmaError, Timer};

use bytes::Bytes;
use rand::Rng;
use tokio::sync::{watch, Notify};
use tokio::time::{self, Duration};

/// Records retried more often than this are dead-lettered.
pub const MAX_REPAIR_RETRIES: u8 = 5;

/// What a work record still has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// Push the winning value to the stale replica.
    UpdateServer,
}

/// One pending repair of a single stale replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRecord {
    id: u64,
    request: Request,
    stale_server: ServerNumber,
    value: Bytes,
    state: WorkState,
    retry_count: u8,
}

impl WorkRecord {
    pub fn new(
        id: u64,
        request: Request,
        stale_server: ServerNumber,
        value: Bytes,
    ) -> Self {
        WorkRecord {
            id,
            request,
            stale_server,
            value,
            state: WorkState::UpdateServer,
            retry_count: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The read that revealed the divergence.
    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline]
    pub fn stale_server(&self) -> ServerNumber {
        self.stale_server
    }

    /// Winning value to push.
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    #[inline]
    pub fn state(&self) -> WorkState {
        self.state
    }

    #[inline]
    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// Moves to a new state; the retry budget starts over.
    pub fn set_state(&mut self, state: WorkState) {
        self.state = state;
        self.retry_count = 0;
    }

    fn repair_request(&self) -> Result<Request, PlasmaError> {
        let key = self.request.key().ok_or_else(|| {
            PlasmaError::msg(format!(
                "repair {} carries a {:?} request without key",
                self.id,
                self.request.request_type()
            ))
        })?;
        Request::write(key, &self.value)
    }
}

/// Pause after processing a record while `depth` records remain queued:
/// `base` when the queue is (nearly) empty, shrinking exponentially as the
/// backlog grows.
pub fn pacing_delay(base: Duration, depth: usize) -> Duration {
    if depth <= 1 {
        return base;
    }
    base.mul_f64((-((depth - 1) as f64)).exp())
}

#[derive(Debug, Default)]
struct QueueState {
    records: VecDeque<WorkRecord>,
    busy: bool,
    holds: usize,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.records.is_empty() && !self.busy && self.holds == 0
    }
}

/// FIFO of work records shared by every request of one client (producers)
/// and its repair worker (single consumer).
#[derive(Debug)]
pub(crate) struct RepairQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    tx_drained: watch::Sender<bool>,
    dead_letters: Mutex<Vec<WorkRecord>>,
    next_id: AtomicU64,
}

impl RepairQueue {
    pub(crate) fn new() -> Self {
        let (tx_drained, _) = watch::channel(true);
        RepairQueue {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            tx_drained,
            dead_letters: Mutex::new(vec![]),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates and queues a record for `stale_server`, returning its id.
    pub(crate) fn enqueue(
        &self,
        request: Request,
        stale_server: ServerNumber,
        value: Bytes,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.push(WorkRecord::new(id, request, stale_server, value));
        id
    }

    pub(crate) fn push(&self, record: WorkRecord) {
        let mut state = self.lock();
        state.records.push_back(record);
        self.tx_drained.send_replace(false);
        drop(state);
        self.notify.notify_one();
    }

    /// Takes the oldest record and marks the queue busy until `finish()`.
    fn pop(&self) -> Option<WorkRecord> {
        let mut state = self.lock();
        let record = state.records.pop_front()?;
        state.busy = true;
        Some(record)
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.busy = false;
        self.tx_drained.send_replace(state.is_drained());
    }

    fn dead_letter(&self, record: WorkRecord) {
        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Keeps the queue from reporting drained while the returned guard
    /// lives, for producers that may still enqueue later.
    pub(crate) fn hold(queue: &Arc<RepairQueue>) -> RepairHold {
        queue.lock().holds += 1;
        queue.tx_drained.send_replace(false);
        RepairHold {
            queue: queue.clone(),
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.holds -= 1;
        self.tx_drained.send_replace(state.is_drained());
    }

    /// Number of records waiting.
    pub(crate) fn depth(&self) -> usize {
        self.lock().records.len()
    }

    /// True iff nothing is queued, in progress, or about to be queued.
    pub(crate) fn is_drained(&self) -> bool {
        self.lock().is_drained()
    }

    pub(crate) async fn wait_drained(
        &self,
        timeout: Duration,
    ) -> Result<(), PlasmaError> {
        let mut rx_drained = self.tx_drained.subscribe();
        let drained = async {
            while !*rx_drained.borrow_and_update() {
                rx_drained.changed().await?;
            }
            Ok::<(), PlasmaError>(())
        };
        match time::timeout(timeout, drained).await {
            Ok(result) => result,
            Err(_) => Err(PlasmaError::msg(format!(
                "repair queue not drained within {:?}, {} records left",
                timeout,
                self.depth()
            ))),
        }
    }

    pub(crate) fn dead_letters(&self) -> Vec<WorkRecord> {
        self.dead_letters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Guard returned by `RepairQueue::hold()`.
pub(crate) struct RepairHold {
    queue: Arc<RepairQueue>,
}

impl RepairHold {
    pub(crate) fn queue(&self) -> &RepairQueue {
        &self.queue
    }
}

impl Drop for RepairHold {
    fn drop(&mut self) {
        self.queue.release();
    }
}

/// Background consumer of a client's repair queue.
pub(crate) struct RepairWorker {
    tag: String,
    queue: Arc<RepairQueue>,
    transport: Arc<dyn Transport>,
    jitter_ms: u64,
    pacing_base: Duration,
    timer: Timer,
    rx_term: watch::Receiver<bool>,
}

impl RepairWorker {
    pub(crate) fn new(
        tag: String,
        queue: Arc<RepairQueue>,
        transport: Arc<dyn Transport>,
        jitter_ms: u64,
        pacing_base: Duration,
        rx_term: watch::Receiver<bool>,
    ) -> Self {
        RepairWorker {
            tag,
            queue,
            transport,
            jitter_ms,
            pacing_base,
            timer: Timer::new(),
            rx_term,
        }
    }

    /// Processes records until termination is signalled. Parks on the
    /// queue's notification while it is empty.
    pub(crate) async fn run(&mut self) {
        pf_debug!(self.tag; "repair worker spawned");

        while !*self.rx_term.borrow() {
            let Some(record) = self.queue.pop() else {
                tokio::select! {
                    _ = self.queue.notify.notified() => {},
                    changed = self.rx_term.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    },
                }
                continue;
            };

            self.process(record).await;
            self.queue.finish();

            self.timer
                .restart(pacing_delay(self.pacing_base, self.queue.depth()));
            pf_trace!(self.tag; "pacing {:?}", self.timer.last_dur());
            tokio::select! {
                _ = self.timer.expired() => {},
                changed = self.rx_term.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
            }
        }

        pf_debug!(self.tag; "repair worker exited");
    }

    async fn process(&mut self, mut record: WorkRecord) {
        if record.retry_count > MAX_REPAIR_RETRIES {
            pf_error!(
                self.tag;
                "giving up repair {} of server {} after {} retries",
                record.id,
                record.stale_server,
                MAX_REPAIR_RETRIES
            );
            self.queue.dead_letter(record);
            return;
        }

        match record.state {
            WorkState::UpdateServer => match self.update_server(&record).await
            {
                Ok(()) => {
                    pf_debug!(
                        self.tag;
                        "repaired server {} (record {})",
                        record.stale_server,
                        record.id
                    );
                    return;
                }
                Err(e) => {
                    pf_debug!(
                        self.tag;
                        "repair {} of server {} failed: {}",
                        record.id,
                        record.stale_server,
                        e
                    );
                }
            },
        }

        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
        self.timer.restart(Duration::from_millis(jitter));
        tokio::select! {
            _ = self.timer.expired() => {},
            _ = self.rx_term.changed() => {},
        }
        record.retry_count += 1;
        self.queue.push(record);
    }

    async fn update_server(
        &self,
        record: &WorkRecord,
    ) -> Result<(), PlasmaError> {
        let request = record.repair_request()?;
        let response = exchange_request(
            self.transport.as_ref(),
            record.stale_server,
            &request,
        )
        .await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(PlasmaError::msg(format!(
                "server replied {:?}",
                response.response_type()
            )))
        }
    }
}

#[cfg(test)]
mod repair_tests {
    use super::*;
    use crate::message::{Response, ResponseType};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn pacing_shape() {
        let base = Duration::from_millis(1000);
        assert_eq!(pacing_delay(base, 0), base);
        assert_eq!(pacing_delay(base, 1), base);
        let mut last = base;
        for depth in 2..20 {
            let delay = pacing_delay(base, depth);
            assert!(delay < last);
            last = delay;
        }
        let two = pacing_delay(base, 2).as_secs_f64();
        assert!((two - (-1f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn set_state_resets_retries() -> Result<(), PlasmaError> {
        let mut record =
            WorkRecord::new(3, Request::read("k")?, 2, Bytes::from("v"));
        record.retry_count = 4;
        record.set_state(WorkState::UpdateServer);
        assert_eq!(record.retry_count(), 0);
        assert_eq!(record.repair_request()?, Request::write("k", "v")?);
        let record = WorkRecord::new(4, Request::Ping, 2, Bytes::new());
        assert!(record.repair_request().is_err());
        Ok(())
    }

    #[test]
    fn queue_drain_flags() -> Result<(), PlasmaError> {
        let queue = Arc::new(RepairQueue::new());
        assert!(queue.is_drained());
        let id0 = queue.enqueue(Request::read("a")?, 1, "x".into());
        let id1 = queue.enqueue(Request::read("b")?, 2, "y".into());
        assert_eq!((id0, id1), (0, 1));
        assert_eq!(queue.depth(), 2);
        assert!(!queue.is_drained());

        let record = queue.pop().ok_or(PlasmaError::msg("empty"))?;
        assert_eq!(record.id(), 0);
        queue.finish();
        assert!(!queue.is_drained());
        queue.pop();
        assert!(!queue.is_drained());
        queue.finish();
        assert!(queue.is_drained());

        let hold = RepairQueue::hold(&queue);
        assert!(!queue.is_drained());
        drop(hold);
        assert!(queue.is_drained());
        Ok(())
    }

    /// Fails the first `failures` exchanges, then answers `Success`.
    struct FlakyTransport {
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FlakyTransport {
        fn new(failures: usize) -> Self {
            FlakyTransport {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn exchange(
            &self,
            _server: ServerNumber,
            payload: Bytes,
        ) -> Result<Bytes, PlasmaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(payload[0], 5);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Ok(Response::new(ResponseType::CouldNotProcessCommand)
                    .as_bytes()
                    .clone());
            }
            Ok(Response::new(ResponseType::Success).as_bytes().clone())
        }
    }

    fn spawn_worker(
        queue: &Arc<RepairQueue>,
        transport: Arc<dyn Transport>,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let (tx_term, rx_term) = watch::channel(false);
        let mut worker = RepairWorker::new(
            "t0".into(),
            queue.clone(),
            transport,
            5,
            Duration::from_millis(5),
            rx_term,
        );
        (tx_term, tokio::spawn(async move { worker.run().await }))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retries_until_success() -> Result<(), PlasmaError> {
        let queue = Arc::new(RepairQueue::new());
        let transport = Arc::new(FlakyTransport::new(3));
        let (tx_term, handle) = spawn_worker(&queue, transport.clone());

        queue.enqueue(Request::read("k")?, 1, "v".into());
        queue.wait_drained(Duration::from_secs(5)).await?;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        assert!(queue.dead_letters().is_empty());

        tx_term.send_replace(true);
        time::timeout(Duration::from_secs(2), handle).await??;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn gives_up_into_dead_letters() -> Result<(), PlasmaError> {
        let queue = Arc::new(RepairQueue::new());
        let transport = Arc::new(FlakyTransport::new(usize::MAX));
        let (tx_term, handle) = spawn_worker(&queue, transport.clone());

        queue.enqueue(Request::read("k")?, 4, "v".into());
        queue.wait_drained(Duration::from_secs(5)).await?;
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].stale_server(), 4);
        assert_eq!(dead[0].retry_count(), MAX_REPAIR_RETRIES + 1);
        assert_eq!(
            transport.calls.load(Ordering::SeqCst),
            MAX_REPAIR_RETRIES as usize + 1
        );

        tx_term.send_replace(true);
        time::timeout(Duration::from_secs(2), handle).await??;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn idle_worker_stops_promptly() -> Result<(), PlasmaError> {
        let queue = Arc::new(RepairQueue::new());
        let (tx_term, handle) =
            spawn_worker(&queue, Arc::new(FlakyTransport::new(0)));
        time::sleep(Duration::from_millis(50)).await;
        tx_term.send_replace(true);
        time::timeout(Duration::from_millis(500), handle).await??;
        Ok(())
    }
}
