use anyhow::{Context, Result};
use configserver::{git, server, Configuration};
use std::path::Path;
use tracing::info;

/// Run the HTTP server until interrupted
pub fn serve(config_path: &Path) -> Result<()> {
    let configuration = Configuration::load(config_path)
        .with_context(|| format!("cannot load configuration from {}", config_path.display()))?;
    info!(
        config = %config_path.display(),
        repositories = configuration.repositories.repositories.len(),
        "configuration loaded"
    );

    if let Some(timeout) = configuration.server.git_timeout() {
        // SAFETY: still single threaded, the runtime is built below
        unsafe { git::set_server_timeouts(timeout) }
            .context("cannot configure git network timeouts")?;
    }

    let runtime = tokio::runtime::Runtime::new().context("cannot start the async runtime")?;
    runtime.block_on(server::serve(configuration))?;
    Ok(())
}
