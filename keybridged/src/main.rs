mod bootstrap;
mod refresh;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use keybridge_core::SecretsClient;
use keybridge_core::config::{Config, default_config_path};
use keybridge_http::{HttpConfig, HttpSecretsClient};
use keybridge_ssh_agent::{AgentConfig, KeyAgent};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use settings::{Args, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    // Before any client is built or secret fetched.
    bootstrap::secure_bootstrap();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)?;
    let settings = Settings::resolve(&args, config)?;

    let client = HttpSecretsClient::new(HttpConfig {
        server: settings.server.clone(),
        timeout: settings.timeout,
        bearer_token: settings.bearer_token.clone(),
    })
    .context("create secrets client")?;
    tracing::info!(server = client.base_url(), prefix = %settings.prefix, "starting agent");

    let agent = Arc::new(
        KeyAgent::new(AgentConfig {
            client: Arc::new(client) as Arc<dyn SecretsClient>,
            prefix: settings.prefix.clone(),
            log_sink: None,
        })
        .context("create agent")?,
    );

    let listener = keybridge_ssh_agent::bind(&settings.socket)
        .with_context(|| format!("listen on {}", settings.socket.display()))?;
    let _socket = SocketFile(settings.socket.clone());

    agent.update().await.context("initialize agent")?;
    tracing::info!(socket = %settings.socket.display(), "agent ready");

    let shutdown = CancellationToken::new();
    let refresher = tokio::spawn(refresh::run(
        Arc::clone(&agent),
        settings.refresh_interval,
        shutdown.clone(),
    ));
    let mut server = tokio::spawn(keybridge_ssh_agent::serve(
        agent,
        listener,
        shutdown.clone(),
    ));

    let server_done = tokio::select! {
        () = shutdown_signal() => {
            tracing::info!("signal received; closing listener");
            false
        }
        _ = &mut server => true,
    };
    shutdown.cancel();
    if !server_done {
        server.await.context("agent server task")?;
    }
    refresher.await.context("refresh task")?;
    tracing::info!("agent stopped");
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Removes the agent socket when dropped.
struct SocketFile(PathBuf);

impl Drop for SocketFile {
    fn drop(&mut self) {
        remove_socket(&self.0);
    }
}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove agent socket: {e}"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("failed to register SIGTERM handler: {e}, falling back to SIGINT only");
            ctrl_c.await.ok();
        }
    }
}
