use super::Heartbeat;
use crate::config::RepositoryConfig;
use crate::error::{ConfigServerError, Result};
use crate::git::{is_transient, Mirror};
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Keeps one repository's checkout current.
///
/// A watcher is either active or stopped. Every refresh cycle runs under the
/// exclusive lock, so [`Watcher::file`] never sees a half written tree. The first
/// unrecoverable error stops it for good and every later read fails with
/// [`ConfigServerError::RepositoryUnavailable`].
pub struct Watcher {
    config: RepositoryConfig,
    checkout: PathBuf,
    mirror: Arc<dyn Mirror>,
    lock: Arc<RwLock<()>>,
    stopped: OnceLock<String>,
}

impl Watcher {
    pub fn new(config: RepositoryConfig, checkout: PathBuf, mirror: Arc<dyn Mirror>) -> Self {
        Self {
            config,
            checkout,
            mirror,
            lock: Arc::new(RwLock::new(())),
            stopped: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn checkout(&self) -> &Path {
        &self.checkout
    }

    pub fn is_active(&self) -> bool {
        self.stopped.get().is_none()
    }

    /// Error that stopped the watcher
    pub fn stop_reason(&self) -> Option<&str> {
        self.stopped.get().map(String::as_str)
    }

    /// Spawn the refresh loop.
    ///
    /// The exclusive lock is taken before returning, so reads issued right after
    /// start wait for the first sync.
    pub fn start(self: &Arc<Self>, heartbeat: UnboundedSender<Heartbeat>) -> JoinHandle<()> {
        let initial = Arc::clone(&self.lock).try_write_owned().ok();
        let watcher = Arc::clone(self);
        tokio::spawn(async move { watcher.run(heartbeat, initial).await })
    }

    async fn run(
        self: Arc<Self>,
        heartbeat: UnboundedSender<Heartbeat>,
        mut initial: Option<OwnedRwLockWriteGuard<()>>,
    ) {
        let interval = self.config.refresh_interval();
        let mut synced = false;
        info!(repository = %self.name(), checkout = %self.checkout.display(), "watcher started");

        loop {
            let guard = match initial.take() {
                Some(guard) => guard,
                None => Arc::clone(&self.lock).write_owned().await,
            };

            let outcome = self.sync().await;
            let now = Utc::now();
            let next = chrono::Duration::from_std(interval)
                .ok()
                .and_then(|interval| now.checked_add_signed(interval));

            let beat = match outcome {
                Ok(()) => {
                    synced = true;
                    info!(repository = %self.name(), next_update = ?next, "repository updated");
                    Heartbeat {
                        repository: self.name().to_string(),
                        last_update: Some(now),
                        next_update: next,
                        error: None,
                        active: true,
                    }
                }
                Err(err) if synced && is_transient(&err) => {
                    warn!(repository = %self.name(), error = %err, "refresh failed, retrying next cycle");
                    Heartbeat {
                        repository: self.name().to_string(),
                        last_update: None,
                        next_update: next,
                        error: Some(err.to_string()),
                        active: true,
                    }
                }
                Err(err) => {
                    let reason = err.to_string();
                    // Must be recorded before readers queued on the lock are released
                    let _ = self.stopped.set(reason.clone());
                    drop(guard);
                    error!(repository = %self.name(), error = %reason, "watcher stopped");
                    let _ = heartbeat.send(Heartbeat {
                        repository: self.name().to_string(),
                        last_update: None,
                        next_update: None,
                        error: Some(reason),
                        active: false,
                    });
                    return;
                }
            };

            drop(guard);
            if heartbeat.send(beat).is_err() {
                warn!(repository = %self.name(), "statistics channel closed");
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn sync(&self) -> Result<()> {
        let mirror = Arc::clone(&self.mirror);
        let config = self.config.clone();
        let checkout = self.checkout.clone();

        tokio::task::spawn_blocking(move || mirror.sync(&config, &checkout))
            .await
            .map_err(|err| ConfigServerError::Other(format!("refresh task failed: {err}")))?
    }

    /// Read a file from the checkout, waiting for any running refresh
    pub async fn file(&self, path: &str) -> Result<Vec<u8>> {
        let _guard = self.lock.read().await;

        if let Some(reason) = self.stop_reason() {
            return Err(ConfigServerError::RepositoryUnavailable {
                repository: self.name().to_string(),
                reason: reason.to_string(),
            });
        }

        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .map_err(|_| ConfigServerError::FileNotFound(path.to_string()))
    }

    /// Map a request path onto a regular file inside the checkout
    fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let not_found = || ConfigServerError::FileNotFound(requested.to_string());
        let relative = Path::new(requested);

        if requested.is_empty() || relative.is_absolute() {
            return Err(not_found());
        }
        for component in relative.components() {
            match component {
                Component::Normal(part) if part != ".git" => {}
                Component::CurDir => {}
                _ => return Err(not_found()),
            }
        }

        let root = self.checkout.canonicalize().map_err(|_| not_found())?;
        let target = root.join(relative).canonicalize().map_err(|_| not_found())?;
        if !target.starts_with(&root) || !target.is_file() {
            return Err(not_found());
        }
        Ok(target)
    }
}
