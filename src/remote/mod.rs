//! Signed HTTP access to the peer panel.
//!
//! Every call the migration makes against the destination host goes
//! through [`client::RemoteClient`], which signs requests per [`signing`]
//! so the peer can authenticate them without a session.

pub mod client;
pub mod signing;

use serde::{Deserialize, Serialize};

pub use client::{RemoteClient, RemoteError};
pub use signing::{SignedHeaders, sign_request};

/// Connection parameters for one peer panel. Immutable for the duration of
/// a migration attempt once stored in the migration state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Peer base URL, e.g. `https://203.0.113.5:8888`.
    pub url: String,
    /// Numeric identifier of the API token on the peer.
    pub token_id: u64,
    /// Shared secret used to key request signatures.
    pub token: String,
}

impl ConnectionInfo {
    /// Host portion of the base URL: scheme, port and path stripped.
    /// This is the address rsync/ssh connect to.
    pub fn host(&self) -> &str {
        let mut host = self.url.as_str();
        if let Some(idx) = host.find("://") {
            host = &host[idx + 3..];
        }
        if let Some(idx) = host.find('/') {
            host = &host[..idx];
        }
        if let Some(idx) = host.find(':') {
            host = &host[..idx];
        }
        host
    }
}
