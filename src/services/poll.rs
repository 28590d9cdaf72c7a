use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shared cancellation flag handed to every tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owner of a running poller. Dropping it cancels the poller.
pub struct PollHandle {
    name: String,
    token: CancelToken,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the loop immediately. Ticks already running see the token
    /// flip and must not publish their result.
    pub fn cancel(&mut self) {
        self.token.cancel();
        // dropping the sender wakes the loop out of its wait
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("poller `{}` panicked", self.name);
            }
            debug!("poller `{}` stopped", self.name);
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs `task` once right away and then every `interval` until the
/// returned handle is cancelled or dropped.
///
/// Each tick runs on its own thread, so a slow tick never delays the
/// next one and ticks may overlap. Cadence is kept against the start
/// time, not the end of the previous tick.
pub fn start<F>(name: &str, interval: Duration, task: F) -> std::io::Result<PollHandle>
where
    F: Fn(&CancelToken) + Send + Sync + 'static,
{
    let token = CancelToken::new();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let task = Arc::new(task);
    let loop_token = token.clone();
    let loop_name = name.to_string();

    let thread = thread::Builder::new().name(format!("poll-{name}")).spawn(move || {
        let mut next_tick = Instant::now();
        let mut tick: u64 = 0;
        loop {
            if loop_token.is_cancelled() {
                break;
            }
            tick += 1;
            let task = Arc::clone(&task);
            let token = loop_token.clone();
            let spawned = thread::Builder::new()
                .name(format!("tick-{loop_name}"))
                .spawn(move || task(&token));
            if let Err(e) = spawned {
                warn!("poller `{}` could not start tick {}: {}", loop_name, tick, e);
            }

            next_tick += interval;
            let wait = next_tick.saturating_duration_since(Instant::now());
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })?;

    debug!("poller `{}` started (interval={}ms)", name, interval.as_millis());
    Ok(PollHandle {
        name: name.to_string(),
        token,
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    })
}
