//! Cache key derivation.
//!
//! A [`RequestFingerprint`] captures the parts of a request that affect its response; the
//! [`CacheKey`] is the hex SHA-256 over those parts, each prefixed by its length so that shifting
//! bytes between adjacent components always changes the key.
//!
//! Bodies are hashed as raw bytes and never parsed, so two bodies that are semantically equal
//! JSON but differ in whitespace or field order produce different keys.

use crate::{middleware::client_id::inbound_credential, types::GatewayRequest};
use http::{HeaderName, Method};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{borrow::Borrow, fmt};

/// Auth fingerprint used when no credential is present (or when keys are shared).
///
/// Cannot collide with a credential fingerprint, which is always 64 hex characters.
const ANONYMOUS_AUTH: &str = "anonymous";

/// Which callers may share a cached response.
///
/// Trust boundary: with [`CredentialScope::PerCredential`], a response stored for one credential
/// is only ever served to requests presenting the same credential, and all uncredentialed
/// requests of identical shape share entries. [`CredentialScope::Shared`] removes the credential
/// from the key entirely, so any caller can be served a response produced for any other caller.
/// Only choose it when upstream responses do not depend on who is asking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    #[default]
    PerCredential,
    Shared,
}

/// Hex-encoded SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response-affecting parts of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFingerprint {
    pub method: String,
    pub path: String,
    pub query: String,
    pub auth: String,
    /// Empty for idempotent read methods.
    pub body: String,
    /// Empty when no vary headers are configured.
    pub vary: String,
}

impl RequestFingerprint {
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        let mut hasher = Sha256::new();
        for component in [&self.method, &self.path, &self.query, &self.auth, &self.body, &self.vary]
        {
            update_prefixed(&mut hasher, component.as_bytes());
        }
        CacheKey(hex::encode(hasher.finalize()))
    }
}

/// Builds fingerprints according to the configured credential scope and vary headers.
#[derive(Debug, Clone, Default)]
pub struct KeyDeriver {
    scope: CredentialScope,
    vary_headers: Vec<HeaderName>,
}

impl KeyDeriver {
    #[must_use]
    pub fn new(scope: CredentialScope, vary_headers: Vec<HeaderName>) -> Self {
        Self { scope, vary_headers }
    }

    #[must_use]
    pub fn scope(&self) -> CredentialScope {
        self.scope
    }

    #[must_use]
    pub fn fingerprint(&self, request: &GatewayRequest) -> RequestFingerprint {
        let auth = match (self.scope, inbound_credential(&request.headers)) {
            (CredentialScope::PerCredential, Some(credential)) => sha256_hex(credential.as_bytes()),
            _ => ANONYMOUS_AUTH.to_string(),
        };

        let body = if is_idempotent_read(&request.method) {
            String::new()
        } else {
            sha256_hex(&request.body)
        };

        RequestFingerprint {
            method: request.method.as_str().to_string(),
            path: request.path.clone(),
            query: request.query.clone().unwrap_or_default(),
            auth,
            body,
            vary: self.vary_fingerprint(request),
        }
    }

    #[must_use]
    pub fn derive_key(&self, request: &GatewayRequest) -> CacheKey {
        self.fingerprint(request).cache_key()
    }

    fn vary_fingerprint(&self, request: &GatewayRequest) -> String {
        if self.vary_headers.is_empty() {
            return String::new();
        }

        let mut hasher = Sha256::new();
        for name in &self.vary_headers {
            update_prefixed(&mut hasher, name.as_str().as_bytes());
            let values = request.headers.get_all(name);
            let mut count = 0u64;
            for value in values {
                update_prefixed(&mut hasher, value.as_bytes());
                count += 1;
            }
            hasher.update(count.to_be_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// GET, HEAD and OPTIONS never contribute a body to the key.
#[must_use]
pub fn is_idempotent_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn update_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
