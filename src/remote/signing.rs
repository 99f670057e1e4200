//! HMAC-SHA256 request signing for peer panel calls.
//!
//! Both panels derive the same signature from the same request material, so
//! the construction here has to be reproducible byte-for-byte:
//!
//! 1. canonical request = `METHOD \n canonical-path \n encoded-query \n
//!    hex-sha256(body)`, where the canonical path starts at the first
//!    `/api` occurrence and an empty body hashes the empty string;
//! 2. string-to-sign = `HMAC-SHA256 \n unix-seconds \n
//!    hex-sha256(canonical request)`;
//! 3. signature = hex HMAC-SHA256 of the string-to-sign, keyed with the
//!    shared secret token.
//!
//! Timestamp freshness and replay rejection are the receiving side's
//! responsibility.

use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm label used in both the string-to-sign and the
/// `Authorization` scheme.
pub const ALGORITHM: &str = "HMAC-SHA256";

/// Header values to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// `X-Timestamp` value (unix seconds).
    pub timestamp: String,
    /// `Authorization` value.
    pub authorization: String,
}

/// Sign one request. `query` is the decoded key/value list; ordering does
/// not matter, the encoding is canonical.
pub fn sign_request(
    method: &str,
    path: &str,
    query: &[(String, String)],
    body: &[u8],
    token_id: u64,
    token: &str,
    timestamp: i64,
) -> SignedHeaders {
    let canonical = canonical_request(method, path, query, body);
    let string_to_sign = format!("{ALGORITHM}\n{timestamp}\n{}", sha256_hex(canonical.as_bytes()));
    let signature = hmac_sha256_hex(string_to_sign.as_bytes(), token);

    SignedHeaders {
        timestamp: timestamp.to_string(),
        authorization: format!("{ALGORITHM} Credential={token_id}, Signature={signature}"),
    }
}

/// Build the canonical request string.
pub fn canonical_request(method: &str, path: &str, query: &[(String, String)], body: &[u8]) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        method,
        canonical_path(path),
        encode_query(query),
        sha256_hex(body)
    )
}

/// Normalize a request path: everything from the first `/api` onward, or
/// the path unchanged when it does not contain one.
pub fn canonical_path(path: &str) -> &str {
    if path.starts_with("/api") {
        return path;
    }
    match path.find("/api") {
        Some(idx) => &path[idx..],
        None => path,
    }
}

/// Canonical query encoding: pairs sorted by key, percent-encoded,
/// `k=v` joined with `&`.
fn encode_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> = query.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256_hex(data: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}
