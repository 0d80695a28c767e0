use super::{Heartbeat, Statistics, Watcher};
use crate::config::{Configuration, RepositoriesSettings, RepositoryConfig};
use crate::error::{ConfigServerError, Result};
use crate::git::{GitMirror, Mirror};
use crate::metrics::Metrics;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

struct Repository {
    watcher: Arc<Watcher>,
    hits: AtomicU64,
}

/// Single entry point for "file F of repository R for client C".
///
/// The repository map is built once and never changes. Statistics are written
/// only by the task draining the watchers' heartbeats.
pub struct RepositoryManager {
    repositories: HashMap<String, Repository>,
    statistics: Arc<RwLock<HashMap<String, Statistics>>>,
    metrics: Option<Metrics>,
    started: AtomicBool,
}

impl RepositoryManager {
    /// Manager backed by libgit2 with the configured network timeout
    pub fn new(configuration: &Configuration) -> Self {
        let mirror = Arc::new(GitMirror::new(configuration.server.git_timeout()));
        Self::with_mirror(&configuration.repositories, mirror)
    }

    pub fn with_mirror(settings: &RepositoriesSettings, mirror: Arc<dyn Mirror>) -> Self {
        let repositories = settings
            .repositories
            .iter()
            .map(|config| {
                let checkout = config.checkout_dir(&settings.checkout_location);
                let watcher = Watcher::new(config.clone(), checkout, Arc::clone(&mirror));
                (
                    config.name.clone(),
                    Repository {
                        watcher: Arc::new(watcher),
                        hits: AtomicU64::new(0),
                    },
                )
            })
            .collect();

        Self {
            repositories,
            statistics: Arc::new(RwLock::new(HashMap::new())),
            metrics: None,
            started: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn one watcher per repository and the statistics task. Returns immediately.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        for repository in self.repositories.values() {
            if let Some(metrics) = &self.metrics {
                metrics.set_repository_active(repository.watcher.name(), true);
            }
            repository.watcher.start(sender.clone());
        }
        info!(repositories = self.repositories.len(), "repository manager started");

        tokio::spawn(drain(
            receiver,
            Arc::clone(&self.statistics),
            self.metrics.clone(),
        ));
    }

    /// Fetch `path` from `repository` on behalf of `client_id`
    pub async fn get(&self, repository: &str, path: &str, client_id: &str) -> Result<Vec<u8>> {
        let entry = self.lookup(repository)?;

        if !entry.watcher.config().is_client_allowed(client_id) {
            return Err(ConfigServerError::ClientNotAllowed {
                client_id: client_id.to_string(),
                repository: repository.to_string(),
            });
        }

        Self::read(entry, path).await
    }

    /// Fetch without the client allow-list, for anonymous deployments
    pub async fn get_unrestricted(&self, repository: &str, path: &str) -> Result<Vec<u8>> {
        let entry = self.lookup(repository)?;
        Self::read(entry, path).await
    }

    async fn read(entry: &Repository, path: &str) -> Result<Vec<u8>> {
        let watcher = &entry.watcher;
        if let Some(reason) = watcher.stop_reason() {
            return Err(ConfigServerError::RepositoryUnavailable {
                repository: watcher.name().to_string(),
                reason: reason.to_string(),
            });
        }

        let content = watcher.file(path).await?;
        entry.hits.fetch_add(1, Ordering::Relaxed);
        Ok(content)
    }

    fn lookup(&self, repository: &str) -> Result<&Repository> {
        self.repositories
            .get(repository)
            .ok_or_else(|| ConfigServerError::RepositoryNotFound(repository.to_string()))
    }

    pub fn contains(&self, repository: &str) -> bool {
        self.repositories.contains_key(repository)
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryConfig> {
        self.repositories.get(name).map(|entry| entry.watcher.config())
    }

    pub fn is_client_allowed(&self, repository: &str, client_id: &str) -> bool {
        self.repository(repository)
            .is_some_and(|config| config.is_client_allowed(client_id))
    }

    /// Snapshot of every repository's statistics, keyed by name
    pub fn statistics(&self) -> BTreeMap<String, Statistics> {
        let recorded = self
            .statistics
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        self.repositories
            .iter()
            .map(|(name, entry)| {
                let mut stats = recorded.get(name).cloned().unwrap_or_default();
                stats.hit_count = entry.hits.load(Ordering::Relaxed);
                stats.active = entry.watcher.is_active();
                (name.clone(), stats)
            })
            .collect()
    }
}

async fn drain(
    mut receiver: UnboundedReceiver<Heartbeat>,
    statistics: Arc<RwLock<HashMap<String, Statistics>>>,
    metrics: Option<Metrics>,
) {
    while let Some(heartbeat) = receiver.recv().await {
        debug!(repository = %heartbeat.repository, active = heartbeat.active, "heartbeat");
        if let Some(metrics) = &metrics {
            metrics.set_repository_active(&heartbeat.repository, heartbeat.active);
        }

        let mut statistics = statistics.write().unwrap_or_else(PoisonError::into_inner);
        statistics
            .entry(heartbeat.repository.clone())
            .or_default()
            .apply(heartbeat);
    }
    debug!("statistics channel closed");
}
