//! Load state shared by every dashboard panel.
//!
//! `Idle -> Loading -> Ready | Failed`, re-entering `Loading` on each
//! refresh. A failure keeps the previously loaded data. Every load gets
//! a monotonic ticket and a result older than the last applied one is
//! dropped, so a slow early response cannot overwrite a newer one.

use log::{debug, warn};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::client::FetchError;
use crate::services::poll::CancelToken;
use crate::utils::lock;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone)]
pub struct ViewState<T> {
    phase: Phase,
    data: Option<T>,
    last_error: Option<String>,
    issued: u64,
    applied: u64,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        ViewState {
            phase: Phase::Idle,
            data: None,
            last_error: None,
            issued: 0,
            applied: 0,
        }
    }
}

impl<T> ViewState<T> {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn begin(&mut self) -> Ticket {
        self.issued += 1;
        self.phase = Phase::Loading;
        Ticket(self.issued)
    }

    /// Applies the outcome of the load identified by `ticket`. Returns
    /// false if a newer result was already applied.
    pub fn finish(&mut self, ticket: Ticket, outcome: Result<T, FetchError>) -> bool {
        if ticket.0 <= self.applied {
            return false;
        }
        self.applied = ticket.0;
        let newer_pending = ticket.0 < self.issued;
        match outcome {
            Ok(data) => {
                self.data = Some(data);
                self.last_error = None;
                self.phase = if newer_pending { Phase::Loading } else { Phase::Ready };
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                self.phase = if newer_pending { Phase::Loading } else { Phase::Failed };
            }
        }
        true
    }

    /// Drops loaded data, e.g. after logout.
    pub fn reset(&mut self) {
        let issued = self.issued;
        *self = ViewState::default();
        // keep tickets monotonic so loads begun before the reset are ignored
        self.issued = issued;
        self.applied = issued;
    }
}

type Loader<T> = Box<dyn Fn() -> Result<T, FetchError> + Send + Sync>;

/// A named view: a loader plus its load state.
pub struct Panel<T> {
    name: &'static str,
    loader: Loader<T>,
    state: Mutex<ViewState<T>>,
    disposed: AtomicBool,
}

impl<T: Clone> Panel<T> {
    pub fn new<F>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Result<T, FetchError> + Send + Sync + 'static,
    {
        Panel {
            name,
            loader: Box::new(loader),
            state: Mutex::new(ViewState::default()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Loads once and publishes the outcome unless the panel was
    /// disposed or `cancel` fired while the request was in flight.
    /// Returns whether the outcome was applied.
    pub fn refresh(&self, cancel: &CancelToken) -> bool {
        if self.is_disposed() || cancel.is_cancelled() {
            return false;
        }
        let ticket = lock(&self.state).begin();
        let outcome = (self.loader)();
        if let Err(e) = &outcome {
            warn!("{}: refresh failed: {}", self.name, e);
        }
        if self.is_disposed() || cancel.is_cancelled() {
            debug!("{}: dropping result of cancelled refresh", self.name);
            return false;
        }
        let applied = lock(&self.state).finish(ticket, outcome);
        if !applied {
            debug!("{}: dropping stale result", self.name);
        }
        applied
    }

    pub fn snapshot(&self) -> ViewState<T> {
        lock(&self.state).clone()
    }

    pub fn reset(&self) {
        lock(&self.state).reset();
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
