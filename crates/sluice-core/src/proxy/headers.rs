//! Header filtering between the client and the upstream.

use http::{header, HeaderMap, HeaderName, HeaderValue};

/// Connection-scoped headers never forwarded in either direction (RFC 9110 §7.6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const API_KEY_HEADER: &str = "x-api-key";

/// Builds the header set sent upstream.
///
/// Hop-by-hop headers, headers named by `Connection`, `Host` and `Content-Length` are dropped.
/// `Accept-Encoding` is dropped too: cached bodies are shared by clients with different
/// encoding support, so the upstream must answer uncompressed. When `upstream_api_key` is set,
/// the client's credential is replaced by `Authorization: Bearer <key>`.
#[must_use]
pub fn upstream_request_headers(inbound: &HeaderMap, upstream_api_key: Option<&str>) -> HeaderMap {
    let mut headers = strip_hop_by_hop(inbound);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::ACCEPT_ENCODING);
    headers.remove(ADMIN_TOKEN_HEADER);

    if let Some(key) = upstream_api_key.filter(|k| !k.is_empty()) {
        headers.remove(header::AUTHORIZATION);
        headers.remove(API_KEY_HEADER);
        match HeaderValue::from_str(&format!("Bearer {key}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("configured upstream api key is not a valid header value"),
        }
    }

    headers
}

/// Builds the header set returned to the client from an upstream response.
///
/// `Content-Length` is dropped since the server layer sets it from the buffered body.
#[must_use]
pub fn client_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = strip_hop_by_hop(upstream);
    headers.remove(header::CONTENT_LENGTH);
    headers
}

fn strip_hop_by_hop(source: &HeaderMap) -> HeaderMap {
    let connection_named: Vec<HeaderName> = source
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut headers = source.clone();
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
    for name in &connection_named {
        headers.remove(name);
    }
    headers
}
