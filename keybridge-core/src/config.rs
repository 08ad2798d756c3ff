use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Daemon configuration, read from `config.toml`.
///
/// Every field may also be given on the command line; flags win over the
/// file.  An absent file is equivalent to an empty one.
///
/// ```toml
/// server = "https://secrets.example.com"
/// socket = "/run/user/1000/keybridge/agent.sock"
/// prefix = "prod/ssh-agent"
/// refresh_interval_secs = 300
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the secrets service.
    #[serde(default)]
    pub server: Option<String>,
    /// Path of the agent's Unix socket.
    #[serde(default)]
    pub socket: Option<PathBuf>,
    /// Secret name prefix to serve.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Re-sync with the secrets service this often.  `None` disables polling.
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
    /// HTTP request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Optional bearer token sent with every request to the secrets service.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            socket: None,
            prefix: None,
            refresh_interval_secs: None,
            timeout_secs: default_timeout_secs(),
            bearer_token: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("socket", &self.socket)
            .field("prefix", &self.prefix)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Load the configuration at `path`.
    ///
    /// A missing file yields the defaults.  A file readable by group or
    /// others is accepted with a warning, since it may hold a bearer token.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        #[cfg(unix)]
        warn_if_shared(path);

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(unix)]
fn warn_if_shared(path: &Path) {
    use std::os::unix::fs::MetadataExt;

    match std::fs::metadata(path) {
        Ok(meta) if meta.mode() & 0o077 != 0 => {
            tracing::warn!(
                path = %path.display(),
                mode = format!("{:o}", meta.mode() & 0o777),
                "config file is accessible by group or others; recommend chmod 600"
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("could not check config file permissions: {e}"),
    }
}

/// `$XDG_CONFIG_HOME/keybridge/config.toml`, falling back to
/// `$HOME/.config/keybridge/config.toml`.
pub fn default_config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("keybridge").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.server.is_none());
        assert!(cfg.prefix.is_none());
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    fn default_agrees_with_empty_file() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(Config::default().timeout_secs, 30);
        assert_eq!(parsed.timeout_secs, Config::default().timeout_secs);
    }

    #[test]
    fn parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
server = "https://secrets.example.com"
socket = "/tmp/agent.sock"
prefix = "prod/ssh-agent"
refresh_interval_secs = 120
bearer_token = "tok"
"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.server.as_deref(), Some("https://secrets.example.com"));
        assert_eq!(cfg.socket, Some(PathBuf::from("/tmp/agent.sock")));
        assert_eq!(cfg.prefix.as_deref(), Some("prod/ssh-agent"));
        assert_eq!(cfg.refresh_interval_secs, Some(120));
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.bearer_token.as_deref(), Some("tok"));
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "prefix = [").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn debug_redacts_bearer_token() {
        let cfg = Config {
            bearer_token: Some("s3cr3t".to_string()),
            ..Config::default()
        };
        let debug = format!("{cfg:?}");
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("s3cr3t"));
    }
}
