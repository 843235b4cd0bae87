//! In-process upstream used by router and admin tests.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use parking_lot::Mutex;
use sluice_core::upstream::{UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

pub struct MockUpstream {
    calls: AtomicUsize,
    failure: Option<fn() -> UpstreamError>,
    last_path: Mutex<Option<String>>,
}

impl MockUpstream {
    pub fn ok() -> Self {
        Self { calls: AtomicUsize::new(0), failure: None, last_path: Mutex::new(None) }
    }

    pub fn failing(failure: fn() -> UpstreamError) -> Self {
        Self { failure: Some(failure), ..Self::ok() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_path(&self) -> Option<String> {
        self.last_path.lock().clone()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn forward(
        &self,
        request: UpstreamRequest,
        _timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_path.lock() = Some(request.path_and_query);

        if let Some(failure) = self.failure {
            return Err(failure());
        }

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Ok(UpstreamResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(br#"{"id":"cmpl-1","object":"chat.completion"}"#),
        })
    }
}
