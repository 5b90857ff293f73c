//! The request pipeline: descriptor → cache → SRV → probe → record.

use crate::address::{self, EndpointDescriptor, SrvLookup};
use crate::cache::TtlCache;
use crate::error::{Error, Result};
use crate::minecraft;
use crate::minecraft::common::StatusRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub type Roster = BTreeMap<String, EndpointDescriptor>;

#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub probe_timeout: Duration,
    pub srv_timeout: Duration,
    pub cache_enabled: bool,
}

/// Owns the roster and the cache; built once at startup and shared by handle.
pub struct ServiceContext {
    roster: RwLock<Arc<Roster>>,
    cache: Arc<TtlCache>,
    srv: Arc<dyn SrvLookup>,
    settings: ProbeSettings,
}

#[derive(Debug, Serialize)]
pub struct RosterReport {
    pub servers: BTreeMap<String, StatusRecord>,
    pub total: usize,
    pub online: usize,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ServerEntry {
    pub name: String,
    #[serde(flatten)]
    pub descriptor: EndpointDescriptor,
}

/// Parses `name=address:port:type:isSrv` lines. Blank lines and `#` comments
/// are ignored; malformed lines are logged and skipped.
pub fn parse_roster<I, S>(lines: I) -> Roster
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut roster = Roster::new();

    for (index, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((name, config)) = line.split_once('=') else {
            warn!("Skipping roster line {}: expected name=address", index + 1);
            continue;
        };

        let name = name.trim();
        if name.is_empty() {
            warn!("Skipping roster line {}: empty server name", index + 1);
            continue;
        }

        match EndpointDescriptor::parse_named(config) {
            Ok(descriptor) => {
                roster.insert(name.to_string(), descriptor);
            }
            Err(e) => warn!("Skipping roster line {} ({}): {}", index + 1, name, e),
        }
    }

    roster
}

impl ServiceContext {
    pub fn new(settings: ProbeSettings, cache: Arc<TtlCache>, srv: Arc<dyn SrvLookup>) -> Self {
        Self {
            roster: RwLock::new(Arc::new(Roster::new())),
            cache,
            srv,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub async fn roster(&self) -> Arc<Roster> {
        self.roster.read().await.clone()
    }

    pub async fn servers(&self) -> Vec<ServerEntry> {
        self.roster()
            .await
            .iter()
            .map(|(name, descriptor)| ServerEntry {
                name: name.clone(),
                descriptor: descriptor.clone(),
            })
            .collect()
    }

    /// Replaces the roster wholesale; readers see the old or the new one,
    /// never a mix.
    pub async fn load_roster<I, S>(&self, lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roster = parse_roster(lines);
        let count = roster.len();
        *self.roster.write().await = Arc::new(roster);
        info!("Loaded {} server configurations", count);
        count
    }

    /// Re-reads the roster file, swaps it in and drops cached records.
    pub async fn reload_from_file(&self, path: &Path) -> Result<usize> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::ConfigParse(format!("cannot read {}: {}", path.display(), e)))?;

        let count = self.load_roster(contents.lines()).await;
        let cleared = self.cache.clear().await;
        debug!("Dropped {} cached records after reload", cleared);
        Ok(count)
    }

    pub async fn query_by_name(&self, name: &str) -> Result<StatusRecord> {
        let roster = self.roster().await;
        let descriptor = roster
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        Ok(self.lookup(name, name, descriptor).await)
    }

    pub async fn query_by_address(&self, spec: &str) -> Result<StatusRecord> {
        let descriptor = EndpointDescriptor::parse_ad_hoc(spec).map_err(|e| match e {
            Error::InvalidAddress(msg) => Error::InvalidRequest(msg),
            other => Error::InvalidRequest(other.to_string()),
        })?;
        let name = format!("{}:{}", descriptor.address, descriptor.port);

        Ok(self
            .lookup(&descriptor.direct_cache_key(), &name, &descriptor)
            .await)
    }

    /// Probes every roster entry concurrently. Each entry settles into a
    /// record of its own, so one bad server never fails the whole report.
    pub async fn query_all(&self) -> RosterReport {
        let started = Instant::now();
        let roster = self.roster().await;

        let probes = roster.iter().map(|(name, descriptor)| async move {
            (name.clone(), self.lookup(name, name, descriptor).await)
        });
        let servers: BTreeMap<String, StatusRecord> =
            futures::future::join_all(probes).await.into_iter().collect();

        let online = servers.values().filter(|record| record.is_online()).count();

        RosterReport {
            total: servers.len(),
            online,
            servers,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn lookup(&self, key: &str, name: &str, descriptor: &EndpointDescriptor) -> StatusRecord {
        if self.settings.cache_enabled {
            if let Some(cached) = self.cache.get(key).await {
                debug!("Returning cached status for {}", key);
                return cached;
            }
        }

        let outcome = async {
            let endpoint =
                address::resolve(descriptor, self.srv.as_ref(), self.settings.srv_timeout).await?;
            minecraft::probe(&endpoint, descriptor.protocol, self.settings.probe_timeout).await
        }
        .await;

        match outcome {
            Ok(status) => {
                info!(
                    "{} online {}/{} [{}] {}ms",
                    name, status.players.online, status.players.max, status.protocol, status.latency_ms
                );
                let record = StatusRecord::online(
                    name.to_string(),
                    descriptor.address.clone(),
                    descriptor.port,
                    status,
                );
                if self.settings.cache_enabled {
                    self.cache.set(key.to_string(), record.clone()).await;
                }
                record
            }
            Err(e) => {
                warn!("{} offline - {}", name, e);
                StatusRecord::offline(name.to_string(), descriptor.address.clone(), descriptor.port, &e)
            }
        }
    }
}
