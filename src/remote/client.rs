//! Signed HTTP client for the peer panel API.

use chrono::Utc;
use reqwest::Method;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use super::ConnectionInfo;
use super::signing::sign_request;

/// Path of the peer's migration trust endpoint (key add/remove).
const SSH_KEY_PATH: &str = "/api/toolbox_migration/ssh_key";

/// Errors from peer panel calls.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-200 response. The body is kept so callers can surface the
    /// peer's error detail.
    #[error("remote API returned status {status} for {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Success envelope every panel endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    #[allow(dead_code)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Signed client bound to one peer panel.
///
/// Panels commonly sit behind self-signed TLS, so certificate validation
/// is disabled; authentication rests on the request signature.
pub struct RemoteClient {
    conn: ConnectionInfo,
    http: Client,
}

impl RemoteClient {
    pub fn new(conn: ConnectionInfo, timeout: std::time::Duration) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(RemoteError::Build)?;
        Ok(Self { conn, http })
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.conn
    }

    /// Send one signed request. `path` must not carry a query string; the
    /// migration API never uses one. Returns the raw response body.
    pub fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String, RemoteError> {
        let url = format!("{}{}", self.conn.url.trim_end_matches('/'), path);
        let body_bytes = match body {
            Some(value) => value.to_string().into_bytes(),
            None => Vec::new(),
        };

        let headers = sign_request(
            method.as_str(),
            path,
            &[],
            &body_bytes,
            self.conn.token_id,
            &self.conn.token,
            Utc::now().timestamp(),
        );

        debug!(method = %method, path = %path, "signed peer request");

        let mut req = self
            .http
            .request(method, url.as_str())
            .header("Content-Type", "application/json")
            .header("X-Timestamp", &headers.timestamp)
            .header("Authorization", &headers.authorization);
        if !body_bytes.is_empty() {
            req = req.body(body_bytes);
        }

        let resp = req.send().map_err(|source| RemoteError::Transport {
            path: path.to_string(),
            source,
        })?;

        let status = resp.status();
        let text = resp.text().map_err(|source| RemoteError::Transport {
            path: path.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }

    /// Fetch the peer's installed-environment map (the precheck probe).
    pub fn installed_environment(&self) -> Result<Value, RemoteError> {
        let path = "/api/home/installed_environment";
        let body = self.request(Method::GET, path, None)?;
        let envelope: Envelope = serde_json::from_str(&body).map_err(|source| RemoteError::Decode {
            path: path.to_string(),
            source,
        })?;
        Ok(envelope.data)
    }

    /// Deploy a public key into the peer's trust store.
    pub fn add_ssh_key(&self, public_key: &str) -> Result<(), RemoteError> {
        self.request(
            Method::POST,
            SSH_KEY_PATH,
            Some(&json!({ "public_key": public_key.trim() })),
        )?;
        Ok(())
    }

    /// Remove a public key from the peer's trust store (exact trimmed-line
    /// match on the far side).
    pub fn remove_ssh_key(&self, public_key: &str) -> Result<(), RemoteError> {
        self.request(
            Method::DELETE,
            SSH_KEY_PATH,
            Some(&json!({ "public_key": public_key.trim() })),
        )?;
        Ok(())
    }

    /// Create a website on the peer. Callers treat failure as a warning.
    pub fn create_website(&self, body: &Value) -> Result<(), RemoteError> {
        self.request(Method::POST, "/api/website", Some(body))?;
        Ok(())
    }

    /// Create a database on the peer. Callers treat failure as a warning.
    pub fn create_database(&self, body: &Value) -> Result<(), RemoteError> {
        self.request(Method::POST, "/api/database", Some(body))?;
        Ok(())
    }

    /// Create a project on the peer. Callers treat failure as a warning.
    pub fn create_project(&self, body: &Value) -> Result<(), RemoteError> {
        self.request(Method::POST, "/api/project", Some(body))?;
        Ok(())
    }
}
