//! Client identification for rate-limit bucketing.
//!
//! A client is identified by a digest of its API credential when one is presented, falling back
//! to its network address. Raw credentials never leave this module: ids and logs only ever see
//! the digest prefix.

use http::HeaderMap;
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Bucket id shared by every request whose address cannot be resolved.
///
/// All such callers share one quota. Deployments behind a proxy that strips addresses should
/// forward `X-Forwarded-For` or `X-Real-IP` to avoid this.
pub const UNKNOWN_CLIENT: &str = "unknown";

const CREDENTIAL_PREFIX: &str = "key:";
const CREDENTIAL_DIGEST_CHARS: usize = 16;

/// Returns the inbound client credential, if any.
///
/// `Authorization: Bearer <token>` yields the token; any other non-empty `Authorization` value is
/// taken verbatim. Without `Authorization`, a non-empty `x-api-key` is used.
#[must_use]
pub fn inbound_credential(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        let token = strip_bearer(value).unwrap_or(value).trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn strip_bearer(value: &str) -> Option<&str> {
    let (scheme, rest) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(rest)
}

/// Derives the rate-limit bucket id for a request.
///
/// Order of precedence: credential digest, first `X-Forwarded-For` address, `X-Real-IP`, transport
/// peer, then [`UNKNOWN_CLIENT`].
///
/// # Example
///
/// ```
/// use http::HeaderMap;
/// use sluice_core::middleware::client_id::identify;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
///
/// assert_eq!(identify(&headers, None), "203.0.113.7");
/// ```
#[must_use]
pub fn identify(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(credential) = inbound_credential(headers) {
        return credential_id(credential);
    }

    if let Some(ip) = forwarded_for(headers) {
        return ip.to_string();
    }

    if let Some(ip) = header_ip(headers, "x-real-ip") {
        return ip.to_string();
    }

    match peer {
        Some(ip) => ip.to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

/// `key:` followed by the first 16 hex characters of SHA-256(credential).
#[must_use]
pub fn credential_id(credential: &str) -> String {
    let digest = hex::encode(Sha256::digest(credential.as_bytes()));
    format!("{CREDENTIAL_PREFIX}{}", &digest[..CREDENTIAL_DIGEST_CHARS])
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    first.parse().ok()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
