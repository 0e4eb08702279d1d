//! Resettable sleep used for pacing background work.

use std::pin::Pin;

use tokio::time::{self, Duration, Instant, Sleep};

/// Single reusable sleep future. Restarting it with a new duration avoids
/// allocating a fresh `Sleep` for every pause of a long-running loop.
///
/// Must be used within the context of a tokio runtime.
#[derive(Debug)]
pub(crate) struct Timer {
    sleep: Pin<Box<Sleep>>,
    last_dur: Duration,
}

impl Timer {
    /// Creates a timer that is already expired.
    pub(crate) fn new() -> Self {
        Timer {
            sleep: Box::pin(time::sleep(Duration::ZERO)),
            last_dur: Duration::ZERO,
        }
    }

    /// Duration used by the last restart.
    pub(crate) fn last_dur(&self) -> Duration {
        self.last_dur
    }

    /// Restarts the timer to expire `dur` from now. A zero duration leaves
    /// the timer expired.
    pub(crate) fn restart(&mut self, dur: Duration) {
        self.last_dur = dur;
        self.sleep.as_mut().reset(Instant::now() + dur);
    }

    /// Waits for the timer to expire. Typically used as a branch of a
    /// `tokio::select!`.
    pub(crate) async fn expired(&mut self) {
        self.sleep.as_mut().await
    }
}
