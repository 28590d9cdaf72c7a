//! Device session: the authenticated device id and its token.
//!
//! `SessionContext` is the single source of truth. It is shared (`Arc`)
//! with every panel, persists to a JSON file so the session survives
//! restarts, and notifies subscribers on login and logout.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::{fs, io};
use thiserror::Error;

use crate::client::{AuthError, FetchError, TelemetryClient};
use crate::models::telemetry::DeviceId;
use crate::utils::lock;

/// Shown wherever a session is required but missing.
pub const NOT_LOGGED_IN: &str = "not logged in; run `login`";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub device_id: DeviceId,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("session file {path} is not valid: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
}

/// Durable storage for the session, one JSON document on disk.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        serde_json::from_str(&raw).map(Some).map_err(|source| SessionStoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes to a sibling temp file first so a crash never leaves a
    /// half-written session behind.
    pub fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let json = serde_json::to_string_pretty(session).map_err(|source| SessionStoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    /// Removes the session file; a missing file is not an error.
    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: io::Error) -> SessionStoreError {
        SessionStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(DeviceId),
    LoggedOut,
}

type Listener = Box<dyn Fn(&SessionEvent) + Send + Sync>;

pub struct SessionContext {
    store: SessionStore,
    current: RwLock<Option<Session>>,
    listeners: Mutex<Vec<Listener>>,
}

impl SessionContext {
    /// Restores a persisted session if there is one. An unreadable file
    /// is logged and treated as logged out.
    pub fn open(store: SessionStore) -> Self {
        let current = match store.load() {
            Ok(session) => session,
            Err(e) => {
                warn!("Ignoring stored session: {}", e);
                None
            }
        };
        SessionContext {
            store,
            current: RwLock::new(current),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn require(&self) -> Result<Session, FetchError> {
        self.current().ok_or(FetchError::NotLoggedIn)
    }

    /// Registers a callback for login/logout. Callbacks run on the
    /// thread that changed the session and must not subscribe again.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        lock(&self.listeners).push(Box::new(listener));
    }

    /// Authenticates and persists the new session.
    ///
    /// Any existing session is discarded first, so a failed attempt
    /// always leaves the context logged out with nothing persisted.
    pub fn login(&self, client: &TelemetryClient, device_id: &str, pin: &str) -> Result<Session, AuthError> {
        self.logout();

        let device_id = DeviceId::parse(device_id).map_err(AuthError::InvalidDeviceId)?;
        let token = client.login(&device_id, pin)?;
        let session = Session {
            device_id: device_id.clone(),
            token,
        };
        self.store
            .save(&session)
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        info!("Logged in as device {} (session stored in {})", device_id, self.store.path().display());
        self.notify(&SessionEvent::LoggedIn(device_id));
        Ok(session)
    }

    /// Clears memory and disk. Safe to call when already logged out.
    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!("Could not remove stored session: {}", e);
        }
        let previous = self.current.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(session) = previous {
            info!("Logged out device {}", session.device_id);
            self.notify(&SessionEvent::LoggedOut);
        }
    }

    /// Re-reads the store and adopts a login or logout made elsewhere
    /// (another process sharing the session file), notifying
    /// subscribers. Returns whether the session changed.
    pub fn sync(&self) -> bool {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring stored session: {}", e);
                None
            }
        };
        let event = {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            if *current == stored {
                return false;
            }
            *current = stored.clone();
            match stored {
                Some(session) => SessionEvent::LoggedIn(session.device_id),
                None => SessionEvent::LoggedOut,
            }
        };
        info!("Session file changed ({:?})", event);
        self.notify(&event);
        true
    }

    fn notify(&self, event: &SessionEvent) {
        for listener in lock(&self.listeners).iter() {
            listener(event);
        }
    }
}
