//! HTTP client for the secrets service.
//!
//! The service exposes a small JSON-over-POST API:
//!
//! 1. `POST {server}/api/list` → every visible secret with its active version
//! 2. `POST {server}/api/get`  → the active value of one secret
//!
//! Requests carry the service's anti-browser header so they cannot be forged
//! by a web page on the same network, and an optional bearer token.

mod api;

use std::time::Duration;

use keybridge_core::{RemoteError, SecretInfo, SecretValue, SecretsClient};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use zeroize::Zeroizing;

use api::{GetRequest, ListRequest, WireSecretInfo, WireSecretValue};

const NO_BROWSERS_HEADER: &str = "Sec-X-Tailscale-No-Browsers";
const NO_BROWSERS_VALUE: &str = "setec";

/// Settings for [`HttpSecretsClient`].
#[derive(Clone)]
pub struct HttpConfig {
    /// Base URL of the service, e.g. `https://secrets.example.com`.
    pub server: String,
    pub timeout: Duration,
    pub bearer_token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("server", &self.server)
            .field("timeout", &self.timeout)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// [`SecretsClient`] backed by the service's HTTP API.
pub struct HttpSecretsClient {
    http: HttpClient,
    base_url: String,
    bearer_token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for HttpSecretsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSecretsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpSecretsClient {
    pub fn new(config: HttpConfig) -> Result<Self, RemoteError> {
        let http = HttpClient::builder()
            .user_agent(format!("keybridge/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.server.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Resp>(&self, method: &str, body: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/api/{method}", self.base_url);

        let mut req = self
            .http
            .post(&url)
            .header(NO_BROWSERS_HEADER, NO_BROWSERS_VALUE)
            .json(body);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        resp.json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl SecretsClient for HttpSecretsClient {
    async fn list(&self) -> Result<Vec<SecretInfo>, RemoteError> {
        let infos: Vec<WireSecretInfo> = self.call("list", &ListRequest::default()).await?;
        debug!(count = infos.len(), "secrets listed");
        Ok(infos.into_iter().map(SecretInfo::from).collect())
    }

    async fn get(&self, name: &str) -> Result<SecretValue, RemoteError> {
        let value: WireSecretValue = self.call("get", &GetRequest { name, version: 0 }).await?;
        debug!(secret = name, version = value.version, "secret fetched");
        Ok(value.into())
    }
}
