//! HTTP registry for server advertisement and discovery.
//!
//! The registry is a small REST service with a single path. Servers
//! `POST` a JSON [`ServerEntry`] to announce themselves and keep doing
//! so on a heartbeat; clients `GET` the same path to list entries that
//! beat within the TTL.
//!
//! Expiry is lazy: a dead entry stays in the store until the next
//! enumeration, which drops it while building the alive list. There is
//! no background sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod heartbeat;

pub use heartbeat::start_heartbeat;

/// Default route the registry mounts its handlers on.
pub const DEFAULT_REGISTRY_PATH: &str = "/wirecall/registry";

/// Default lifetime of an entry after its last heartbeat.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A server advertisement: transport protocol plus dial address.
///
/// This is the JSON document exchanged on the registry path, and the
/// unit the discovery layer hands to [`crate::transport::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Transport protocol name, e.g. `"tcp"` or `"unix"`.
    pub protocol: String,
    /// Address in the protocol's own format.
    pub address: String,
}

impl ServerEntry {
    /// Create an entry from a protocol name and address.
    pub fn new(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            address: address.into(),
        }
    }

    /// Store key. Two entries are the same server when both the
    /// protocol and the address match.
    fn key(&self) -> String {
        format!("{}@{}", self.protocol, self.address)
    }
}

struct StampedEntry {
    entry: ServerEntry,
    last_beat: Instant,
}

/// Shared heartbeat store behind the HTTP handlers.
#[derive(Clone)]
struct Store {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, StampedEntry>>>,
}

impl Store {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, StampedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or refresh an entry, stamping it with the current time.
    fn upsert(&self, entry: ServerEntry) {
        self.entries().insert(
            entry.key(),
            StampedEntry {
                entry,
                last_beat: Instant::now(),
            },
        );
    }

    /// Enumerate entries that beat within the TTL.
    ///
    /// Expired entries are removed here, as part of building the list.
    fn alive(&self) -> Vec<ServerEntry> {
        let mut entries = self.entries();
        let now = Instant::now();
        entries.retain(|_, stamped| now.duration_since(stamped.last_beat) < self.ttl);
        let mut alive: Vec<ServerEntry> =
            entries.values().map(|stamped| stamped.entry.clone()).collect();
        alive.sort_by(|a, b| a.key().cmp(&b.key()));
        alive
    }
}

async fn list_alive(State(store): State<Store>) -> Json<Vec<ServerEntry>> {
    Json(store.alive())
}

async fn beat(State(store): State<Store>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<ServerEntry>(&body) {
        Ok(entry) => {
            tracing::debug!(protocol = %entry.protocol, address = %entry.address, "heartbeat");
            store.upsert(entry);
            StatusCode::OK
        }
        Err(error) => {
            tracing::warn!(%error, "rejecting malformed heartbeat body");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn router(store: Store, path: &str) -> Router {
    Router::new()
        .route(path, get(list_alive).post(beat))
        .with_state(store)
}

/// Registry tuning knobs.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Route the handlers are mounted on.
    pub path: String,
    /// Lifetime of an entry after its last heartbeat.
    pub ttl: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            path: DEFAULT_REGISTRY_PATH.to_string(),
            ttl: DEFAULT_TTL,
        }
    }
}

/// A bound registry server, ready to serve.
///
/// Binding and serving are separate steps so callers can bind to port 0
/// and read the assigned address before the accept loop starts.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> wirecall::Result<()> {
/// let registry = wirecall::registry::RegistryServer::bind("127.0.0.1:0").await?;
/// let addr = registry.local_addr()?;
/// tokio::spawn(registry.serve());
/// println!("registry at http://{addr}");
/// # Ok(())
/// # }
/// ```
pub struct RegistryServer {
    listener: tokio::net::TcpListener,
    store: Store,
    path: String,
}

impl RegistryServer {
    /// Bind a registry with default options.
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with(addr, RegistryOptions::default()).await
    }

    /// Bind a registry with explicit options.
    pub async fn bind_with(addr: &str, options: RegistryOptions) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            store: Store::new(options.ttl),
            path: options.path,
        })
    }

    /// The address the registry is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the HTTP server until the task is dropped or fails.
    pub async fn serve(self) -> Result<()> {
        tracing::info!(path = %self.path, "registry serving");
        let app = router(self.store, &self.path);
        axum::serve(self.listener, app).await?;
        Ok(())
    }
}
