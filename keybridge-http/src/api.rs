//! Wire types for the secrets service JSON API.
//!
//! Field names follow the service's capitalised JSON encoding.  Secret values
//! travel as standard base64.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use keybridge_core::{SecretBytes, SecretInfo, SecretValue, SecretVersion};
use serde::{Deserialize, Deserializer, Serialize};
use zeroize::Zeroizing;

/// Body of `POST /api/list`.  The service takes no list parameters.
#[derive(Debug, Default, Serialize)]
pub struct ListRequest {}

/// Body of `POST /api/get`.  `Version: 0` selects the active version.
#[derive(Debug, Serialize)]
pub struct GetRequest<'a> {
    #[serde(rename = "Name")]
    pub name: &'a str,
    #[serde(rename = "Version")]
    pub version: u64,
}

/// One element of the `/api/list` response.
///
/// The service also reports every stored version; only the active one
/// matters here.
#[derive(Debug, Deserialize)]
pub struct WireSecretInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ActiveVersion")]
    pub active_version: u64,
}

impl From<WireSecretInfo> for SecretInfo {
    fn from(w: WireSecretInfo) -> Self {
        Self {
            name: w.name,
            active_version: SecretVersion(w.active_version),
        }
    }
}

/// The `/api/get` response.
#[derive(Deserialize)]
pub struct WireSecretValue {
    #[serde(rename = "Value", deserialize_with = "decode_value")]
    pub value: SecretBytes,
    #[serde(rename = "Version")]
    pub version: u64,
}

impl From<WireSecretValue> for SecretValue {
    fn from(w: WireSecretValue) -> Self {
        Self {
            version: SecretVersion(w.version),
            value: w.value,
        }
    }
}

fn decode_value<'de, D>(deserializer: D) -> Result<SecretBytes, D::Error>
where
    D: Deserializer<'de>,
{
    // The encoded form is as sensitive as the decoded one.
    let encoded = Zeroizing::new(String::deserialize(deserializer)?);
    B64.decode(encoded.as_bytes())
        .map(SecretBytes::new)
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_response_decodes() {
        let body = r#"[
            {"Name": "prod/ssh-agent/web", "Versions": [1, 2, 3], "ActiveVersion": 2},
            {"Name": "prod/db-password", "Versions": [1], "ActiveVersion": 1}
        ]"#;
        let infos: Vec<WireSecretInfo> = serde_json::from_str(body).unwrap();
        assert_eq!(infos.len(), 2);

        let info = SecretInfo::from(infos.into_iter().next().unwrap());
        assert_eq!(info.name, "prod/ssh-agent/web");
        assert_eq!(info.active_version, SecretVersion(2));
    }

    #[test]
    fn get_response_decodes_base64_value() {
        let body = r#"{"Value": "aHVudGVyMg==", "Version": 5}"#;
        let wire: WireSecretValue = serde_json::from_str(body).unwrap();
        let value = SecretValue::from(wire);
        assert_eq!(value.version, SecretVersion(5));
        assert_eq!(value.value.as_slice(), b"hunter2");
    }

    #[test]
    fn get_response_rejects_bad_base64() {
        let body = r#"{"Value": "!!not base64!!", "Version": 1}"#;
        assert!(serde_json::from_str::<WireSecretValue>(body).is_err());
    }

    #[test]
    fn get_request_selects_active_version() {
        let req = GetRequest {
            name: "prod/ssh-agent/web",
            version: 0,
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"Name":"prod/ssh-agent/web","Version":0}"#
        );
        assert_eq!(serde_json::to_string(&ListRequest {}).unwrap(), "{}");
    }
}
