use crate::config::RepositoryConfig;
use crate::error::{ConfigServerError, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, ErrorClass, FetchOptions, RemoteCallbacks, Repository};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Username sent alongside a repository token over HTTPS
pub const TOKEN_USERNAME: &str = "x-access-token";

/// Brings a local checkout in line with its upstream.
///
/// Called from a blocking thread while the watcher holds the checkout's exclusive lock.
pub trait Mirror: Send + Sync + 'static {
    fn sync(&self, repository: &RepositoryConfig, checkout: &Path) -> Result<()>;
}

/// libgit2 backed mirror
#[derive(Clone, Debug, Default)]
pub struct GitMirror {
    timeout: Option<Duration>,
}

impl GitMirror {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Remote callbacks carrying the token and transfer deadline
    fn fetch_options(&self, repository: &RepositoryConfig) -> FetchOptions<'static> {
        let mut callbacks = RemoteCallbacks::new();

        if let Some(token) = repository.token.clone() {
            callbacks.credentials(move |_url, _username, _allowed| {
                Cred::userpass_plaintext(TOKEN_USERNAME, &token)
            });
        }

        // Returning false from the progress callback aborts the transfer
        if let Some(deadline) = self.timeout.and_then(|t| Instant::now().checked_add(t)) {
            callbacks.transfer_progress(move |_progress| Instant::now() < deadline);
        }

        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options
    }

    /// Clone the configured branch into an empty directory
    fn clone_into(&self, repository: &RepositoryConfig, checkout: &Path) -> Result<()> {
        std::fs::create_dir_all(checkout)?;
        debug!(repository = %repository.name, checkout = %checkout.display(), "cloning");

        RepoBuilder::new()
            .branch(&repository.branch)
            .fetch_options(self.fetch_options(repository))
            .clone(&repository.url, checkout)?;
        Ok(())
    }

    /// Fetch the branch and force the working tree onto it
    fn pull(&self, repository: &RepositoryConfig, checkout: &Path) -> Result<()> {
        let repo = Repository::open(checkout)?;
        let branch = &repository.branch;
        debug!(repository = %repository.name, branch = %branch, "fetching");

        let mut remote = repo.find_remote("origin")?;
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        remote.fetch(&[refspec.as_str()], Some(&mut self.fetch_options(repository)), None)?;

        let commit = repo
            .find_reference(&format!("refs/remotes/origin/{branch}"))?
            .peel_to_commit()?;

        let local = format!("refs/heads/{branch}");
        repo.reference(&local, commit.id(), true, "configserver: sync")?;
        repo.set_head(&local)?;
        repo.checkout_head(Some(CheckoutBuilder::new().force().remove_untracked(true)))?;
        Ok(())
    }
}

impl Mirror for GitMirror {
    fn sync(&self, repository: &RepositoryConfig, checkout: &Path) -> Result<()> {
        if checkout.join(".git").exists() {
            self.pull(repository, checkout)
        } else {
            self.clone_into(repository, checkout)
        }
    }
}

/// Bound libgit2's connect and socket read waits, which the transfer deadline
/// of [`GitMirror`] cannot reach.
///
/// # Safety
/// libgit2 options are unsynchronized globals: call this before any other thread
/// is spawned.
pub unsafe fn set_server_timeouts(timeout: Duration) -> Result<()> {
    let millis = server_timeout_millis(timeout);
    git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
    git2::opts::set_server_timeout_in_milliseconds(millis)?;
    Ok(())
}

fn server_timeout_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

/// Network hiccups on an existing checkout are retried on the next cycle
pub fn is_transient(error: &ConfigServerError) -> bool {
    match error {
        ConfigServerError::Git(err) => {
            matches!(err.class(), ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl)
        }
        _ => false,
    }
}
