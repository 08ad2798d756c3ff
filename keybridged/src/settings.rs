use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use keybridge_core::config::Config;
use zeroize::Zeroizing;

/// Serve an SSH key agent from keys held in a secrets service.
#[derive(Parser, Clone, Debug, Default)]
#[command(name = "keybridged", version)]
pub struct Args {
    /// Secrets service base URL.
    #[arg(long, env = "KEYBRIDGE_SERVER")]
    pub server: Option<String>,

    /// Path of the agent socket to create.
    #[arg(long, env = "KEYBRIDGE_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Serve secrets whose names start with this prefix.
    #[arg(long, env = "KEYBRIDGE_PREFIX")]
    pub prefix: Option<String>,

    /// Re-sync keys every SECS seconds (0 disables).
    #[arg(long = "refresh-interval", value_name = "SECS", env = "KEYBRIDGE_REFRESH_INTERVAL")]
    pub refresh_interval: Option<u64>,

    /// Config file (default: $XDG_CONFIG_HOME/keybridge/config.toml).
    #[arg(short, long, env = "KEYBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `keybridge_ssh_agent=debug`.  Overrides
    /// `RUST_LOG`.
    #[arg(long, env = "KEYBRIDGE_LOG")]
    pub log_level: Option<String>,
}

/// Effective settings after merging flags over the config file.
pub struct Settings {
    pub server: String,
    pub socket: PathBuf,
    pub prefix: String,
    pub refresh_interval: Option<Duration>,
    pub timeout: Duration,
    pub bearer_token: Option<Zeroizing<String>>,
}

impl Settings {
    pub fn resolve(args: &Args, config: Config) -> Result<Self> {
        let server = args.server.clone().or(config.server).unwrap_or_default();
        let socket = args.socket.clone().or(config.socket);
        let prefix = args.prefix.clone().or(config.prefix).unwrap_or_default();

        if server.is_empty() {
            bail!("a secrets --server address is required");
        }
        let Some(socket) = socket.filter(|p| !p.as_os_str().is_empty()) else {
            bail!("an agent --socket path is required");
        };
        if prefix.is_empty() {
            bail!("a secret name --prefix is required");
        }

        if config.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }

        let refresh_interval = args
            .refresh_interval
            .or(config.refresh_interval_secs)
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            server,
            socket,
            prefix,
            refresh_interval,
            timeout: Duration::from_secs(config.timeout_secs),
            bearer_token: config.bearer_token.map(Zeroizing::new),
        })
    }
}
