//! In-memory directory of authorized clients.
//!
//! The directory holds one immutable [`ClientSnapshot`] behind an
//! [`ArcSwap`]. Every refresh fetches the complete list from the
//! [`ClientSource`] and swaps in a new snapshot, so readers never see a
//! partially updated list and never take a lock. Concurrent refreshes race
//! benignly: the last completed swap wins.
//!
//! Lifecycle:
//! * [`ClientDirectory::start`] performs a blocking initial load (failure
//!   aborts startup) and spawns the periodic refresher.
//! * [`ClientDirectory::refresh_now`] refreshes on demand; once it resolves,
//!   subsequent [`ClientDirectory::snapshot`] calls observe the new list.
//! * [`ClientDirectory::stop`] aborts the refresher.
use std::{collections::HashMap, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr, bail};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::{metrics, ports::client_source::ClientSource};

/// A directory entry. Only the identifier is interpreted by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: String,
    pub attributes: Map<String, Value>,
}

impl Client {
    /// Build a client from a raw directory record. The identifier is read from
    /// `_id`, falling back to `id`; string and numeric identifiers are accepted.
    pub fn from_record(record: Value) -> Option<Self> {
        let Value::Object(attributes) = record else {
            return None;
        };
        let id = ["_id", "id"]
            .iter()
            .find_map(|key| match attributes.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })?;
        Some(Self { id, attributes })
    }
}

/// One complete, immutable view of the directory.
#[derive(Debug, Default)]
pub struct ClientSnapshot {
    clients: Vec<Arc<Client>>,
    index: HashMap<String, usize>,
    loaded_at: Option<DateTime<Utc>>,
}

impl ClientSnapshot {
    pub fn new(clients: Vec<Client>) -> Self {
        let clients: Vec<Arc<Client>> = clients.into_iter().map(Arc::new).collect();
        let mut index = HashMap::with_capacity(clients.len());
        for (position, client) in clients.iter().enumerate() {
            // first record wins on duplicate identifiers
            index.entry(client.id.clone()).or_insert(position);
        }
        Self {
            clients,
            index,
            loaded_at: Some(Utc::now()),
        }
    }

    pub fn find(&self, id: &str) -> Option<Arc<Client>> {
        self.index.get(id).map(|&position| self.clients[position].clone())
    }

    pub fn clients(&self) -> &[Arc<Client>] {
        &self.clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// `false` until the first successful fetch.
    pub fn is_loaded(&self) -> bool {
        self.loaded_at.is_some()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

/// Injectable, explicitly started directory service.
pub struct ClientDirectory {
    snapshot: ArcSwap<ClientSnapshot>,
    source: Arc<dyn ClientSource>,
    refresh_interval: Duration,
    refresher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ClientDirectory {
    pub fn new(source: Arc<dyn ClientSource>, refresh_interval: Duration) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ClientSnapshot::default()),
            source,
            refresh_interval,
            refresher: std::sync::Mutex::new(None),
        }
    }

    /// Initial blocking load followed by the periodic refresher.
    /// A zero refresh interval is rejected before anything is fetched.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.refresh_interval.is_zero() {
            bail!("Client directory refresh interval must be non-zero");
        }
        let count = self
            .refresh_now()
            .await
            .wrap_err("Initial client directory load failed")?;
        tracing::info!(
            clients = count,
            interval = ?self.refresh_interval,
            "Client directory loaded, starting refresher"
        );

        let directory = Arc::clone(self);
        let period = self.refresh_interval;
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if let Err(e) = directory.refresh_now().await {
                    tracing::warn!(
                        "Periodic client directory refresh failed, keeping previous snapshot: {:#}",
                        e
                    );
                }
            }
        });

        if let Some(previous) = self.lock_refresher().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Abort the periodic refresher. The last snapshot stays readable.
    pub fn stop(&self) {
        if let Some(handle) = self.lock_refresher().take() {
            handle.abort();
            tracing::info!("Client directory refresher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_refresher()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Fetch the full list and atomically replace the snapshot.
    /// On failure the previous snapshot is left untouched.
    pub async fn refresh_now(&self) -> Result<usize> {
        let records = match self.source.fetch_clients().await {
            Ok(records) => records,
            Err(e) => {
                metrics::increment_directory_refresh("error");
                return Err(e).wrap_err("Failed to fetch client directory");
            }
        };

        let total = records.len();
        let clients: Vec<Client> = records.into_iter().filter_map(Client::from_record).collect();
        if clients.len() != total {
            tracing::warn!(
                skipped = total - clients.len(),
                "Skipped client records without an identifier"
            );
        }

        let count = clients.len();
        self.snapshot.store(Arc::new(ClientSnapshot::new(clients)));
        metrics::increment_directory_refresh("ok");
        metrics::set_client_directory_size(count);
        tracing::debug!(clients = count, "Client directory refreshed");
        Ok(count)
    }

    /// The current snapshot. Cheap; never blocks on a refresh in progress.
    pub fn snapshot(&self) -> Arc<ClientSnapshot> {
        self.snapshot.load_full()
    }

    pub fn find(&self, id: &str) -> Option<Arc<Client>> {
        self.snapshot.load().find(id)
    }

    fn lock_refresher(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        // a poisoned lock only means a panic while swapping the handle
        self.refresher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ClientDirectory {
    fn drop(&mut self) {
        self.stop();
    }
}
