//! Client-side server discovery.
//!
//! [`StaticDiscovery`] serves a fixed list handed to it at construction
//! and picks one entry per call through an injected [`LoadBalance`]
//! strategy. [`RegistryDiscovery`] wraps a `StaticDiscovery` and keeps
//! its list synced from an HTTP registry, refreshing at most once per
//! TTL window so lookups between refreshes stay local.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::balance::{LoadBalance, RoundRobin};
use crate::error::{Result, WirecallError};
use crate::registry::heartbeat::DEFAULT_HTTP_TIMEOUT;
use crate::registry::ServerEntry;

/// Default time a fetched server list stays fresh.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(10);

/// A source of dialable servers.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Re-sync the candidate list from the backing source.
    async fn refresh(&self) -> Result<()>;

    /// Replace the candidate list outright.
    async fn update(&self, servers: Vec<ServerEntry>) -> Result<()>;

    /// Select one server for the next call.
    async fn get(&self) -> Result<ServerEntry>;

    /// Snapshot of every known server.
    async fn get_all(&self) -> Result<Vec<ServerEntry>>;
}

/// Discovery over a fixed, in-memory server list.
pub struct StaticDiscovery {
    servers: Mutex<Vec<ServerEntry>>,
    strategy: Mutex<Box<dyn LoadBalance>>,
}

impl StaticDiscovery {
    /// Create a discovery over `servers` with round-robin selection.
    pub fn new(servers: Vec<ServerEntry>) -> Self {
        Self::with_strategy(servers, Box::new(RoundRobin::new()))
    }

    /// Create a discovery over `servers` with an explicit strategy.
    pub fn with_strategy(servers: Vec<ServerEntry>, strategy: Box<dyn LoadBalance>) -> Self {
        Self {
            servers: Mutex::new(servers),
            strategy: Mutex::new(strategy),
        }
    }

    fn servers(&self) -> MutexGuard<'_, Vec<ServerEntry>> {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for StaticDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticDiscovery")
            .field("servers", &*self.servers())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn refresh(&self) -> Result<()> {
        // The list is whatever the caller last set; there is no
        // backing source to consult.
        Ok(())
    }

    async fn update(&self, servers: Vec<ServerEntry>) -> Result<()> {
        *self.servers() = servers;
        Ok(())
    }

    async fn get(&self) -> Result<ServerEntry> {
        let servers = self.servers();
        if servers.is_empty() {
            return Err(WirecallError::NoAvailableServers);
        }
        let index = self
            .strategy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pick(servers.len());
        Ok(servers[index].clone())
    }

    async fn get_all(&self) -> Result<Vec<ServerEntry>> {
        Ok(self.servers().clone())
    }
}

/// Discovery backed by an HTTP registry.
///
/// Lookups go through a cached list; the registry is only re-queried
/// when the cache is older than the refresh TTL. A TTL of zero fetches
/// on every lookup.
pub struct RegistryDiscovery {
    inner: StaticDiscovery,
    registry_url: String,
    refresh_ttl: Duration,
    last_refresh: tokio::sync::Mutex<Option<Instant>>,
    http: reqwest::Client,
}

impl RegistryDiscovery {
    /// Create a discovery against `registry_url` with the default
    /// refresh TTL and round-robin selection.
    ///
    /// `registry_url` is the full registry endpoint, e.g.
    /// `http://127.0.0.1:9091/wirecall/registry`.
    pub fn new(registry_url: &str) -> Result<Self> {
        Self::with_options(registry_url, DEFAULT_REFRESH_TTL, Box::new(RoundRobin::new()))
    }

    /// Create a discovery with an explicit refresh TTL and strategy.
    pub fn with_options(
        registry_url: &str,
        refresh_ttl: Duration,
        strategy: Box<dyn LoadBalance>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            inner: StaticDiscovery::with_strategy(Vec::new(), strategy),
            registry_url: registry_url.to_string(),
            refresh_ttl,
            last_refresh: tokio::sync::Mutex::new(None),
            http,
        })
    }
}

impl fmt::Debug for RegistryDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryDiscovery")
            .field("registry_url", &self.registry_url)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    /// Fetch the alive list from the registry, unless the cache is
    /// still inside the refresh TTL.
    ///
    /// Holding the refresh lock across the fetch keeps concurrent
    /// lookups from stampeding the registry with duplicate requests.
    async fn refresh(&self) -> Result<()> {
        let mut last_refresh = self.last_refresh.lock().await;
        if let Some(at) = *last_refresh {
            if at.elapsed() < self.refresh_ttl {
                return Ok(());
            }
        }

        let servers: Vec<ServerEntry> = self
            .http
            .get(self.registry_url.as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!(url = %self.registry_url, count = servers.len(), "refreshed server list");

        self.inner.update(servers).await?;
        *last_refresh = Some(Instant::now());
        Ok(())
    }

    async fn update(&self, servers: Vec<ServerEntry>) -> Result<()> {
        self.inner.update(servers).await?;
        // A manual update is as fresh as a fetch.
        *self.last_refresh.lock().await = Some(Instant::now());
        Ok(())
    }

    async fn get(&self) -> Result<ServerEntry> {
        self.refresh().await?;
        self.inner.get().await
    }

    async fn get_all(&self) -> Result<Vec<ServerEntry>> {
        self.refresh().await?;
        self.inner.get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::Random;
    use crate::registry::{RegistryServer, DEFAULT_REGISTRY_PATH};

    fn entries(n: usize) -> Vec<ServerEntry> {
        (0..n)
            .map(|i| ServerEntry::new("tcp", format!("127.0.0.1:{}", 4000 + i)))
            .collect()
    }

    #[tokio::test]
    async fn test_static_empty_list_has_no_servers() {
        let discovery = StaticDiscovery::new(Vec::new());
        assert!(matches!(
            discovery.get().await,
            Err(WirecallError::NoAvailableServers)
        ));
    }

    #[tokio::test]
    async fn test_static_round_robin_cycles() {
        let discovery = StaticDiscovery::new(entries(3));
        let mut picked = Vec::new();
        for _ in 0..6 {
            picked.push(discovery.get().await.unwrap().address);
        }
        assert_eq!(
            picked,
            vec![
                "127.0.0.1:4000",
                "127.0.0.1:4001",
                "127.0.0.1:4002",
                "127.0.0.1:4000",
                "127.0.0.1:4001",
                "127.0.0.1:4002",
            ]
        );
    }

    #[tokio::test]
    async fn test_static_random_strategy_picks_known_servers() {
        let listed = entries(4);
        let discovery =
            StaticDiscovery::with_strategy(listed.clone(), Box::new(Random::with_seed(9)));
        for _ in 0..50 {
            let picked = discovery.get().await.unwrap();
            assert!(listed.contains(&picked));
        }
    }

    #[tokio::test]
    async fn test_static_update_replaces_list() {
        let discovery = StaticDiscovery::new(entries(2));
        discovery
            .update(vec![ServerEntry::new("tcp", "10.0.0.1:9000")])
            .await
            .unwrap();
        assert_eq!(
            discovery.get_all().await.unwrap(),
            vec![ServerEntry::new("tcp", "10.0.0.1:9000")]
        );
    }

    async fn bind_registry() -> (String, reqwest::Client, tokio::task::JoinHandle<Result<()>>) {
        let registry = RegistryServer::bind("127.0.0.1:0").await.unwrap();
        let addr = registry.local_addr().unwrap();
        let server = tokio::spawn(registry.serve());
        let url = format!("http://{addr}{DEFAULT_REGISTRY_PATH}");
        (url, reqwest::Client::new(), server)
    }

    async fn announce(http: &reqwest::Client, url: &str, entry: &ServerEntry) {
        http.post(url).json(entry).send().await.unwrap().error_for_status().unwrap();
    }

    #[tokio::test]
    async fn test_registry_discovery_fetches_alive_servers() {
        let (url, http, _server) = bind_registry().await;
        announce(&http, &url, &ServerEntry::new("tcp", "127.0.0.1:4000")).await;
        announce(&http, &url, &ServerEntry::new("tcp", "127.0.0.1:4001")).await;

        let discovery = RegistryDiscovery::with_options(
            &url,
            Duration::ZERO,
            Box::new(RoundRobin::new()),
        )
        .unwrap();
        assert_eq!(discovery.get_all().await.unwrap().len(), 2);
        assert_eq!(discovery.get().await.unwrap().address, "127.0.0.1:4000");
        assert_eq!(discovery.get().await.unwrap().address, "127.0.0.1:4001");
    }

    #[tokio::test]
    async fn test_refresh_is_gated_by_ttl() {
        let (url, http, _server) = bind_registry().await;
        announce(&http, &url, &ServerEntry::new("tcp", "127.0.0.1:4000")).await;

        let discovery = RegistryDiscovery::with_options(
            &url,
            Duration::from_secs(60),
            Box::new(RoundRobin::new()),
        )
        .unwrap();
        assert_eq!(discovery.get_all().await.unwrap().len(), 1);

        // A second server arrives, but the cache is still fresh so the
        // discovery keeps serving the old list.
        announce(&http, &url, &ServerEntry::new("tcp", "127.0.0.1:4001")).await;
        assert_eq!(discovery.get_all().await.unwrap().len(), 1);

        let eager = RegistryDiscovery::with_options(
            &url,
            Duration::ZERO,
            Box::new(RoundRobin::new()),
        )
        .unwrap();
        assert_eq!(eager.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cached_list_survives_registry_outage() {
        let (url, http, server) = bind_registry().await;
        announce(&http, &url, &ServerEntry::new("tcp", "127.0.0.1:4000")).await;

        let discovery = RegistryDiscovery::with_options(
            &url,
            Duration::from_secs(60),
            Box::new(RoundRobin::new()),
        )
        .unwrap();
        assert_eq!(discovery.get().await.unwrap().address, "127.0.0.1:4000");

        // Inside the TTL the registry is never contacted, so lookups
        // keep working after it goes away.
        server.abort();
        assert_eq!(discovery.get().await.unwrap().address, "127.0.0.1:4000");
    }
}
