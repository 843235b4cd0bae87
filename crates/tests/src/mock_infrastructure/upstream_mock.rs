//! Upstream mock builder.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use std::{io::Write, time::Duration};

pub const CHAT_PATH: &str = "/v1/chat/completions";

/// A minimal chat completion payload.
#[must_use]
pub fn chat_completion_body(id: &str) -> String {
    json!({
        "id": id,
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": "hi" } }],
    })
    .to_string()
}

/// Builder for mock upstream responses backed by a fresh mockito server.
pub struct UpstreamMockBuilder {
    server: ServerGuard,
}

impl UpstreamMockBuilder {
    pub async fn new() -> Self {
        Self { server: Server::new_async().await }
    }

    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// `POST /v1/chat/completions` answering 200, expected `hits` times.
    pub async fn mock_chat_completion(&mut self, hits: usize) -> Mock {
        self.server
            .mock("POST", CHAT_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_completion_body("cmpl-1"))
            .expect(hits)
            .create_async()
            .await
    }

    /// Like [`Self::mock_chat_completion`] but only matching requests carrying `header: value`.
    pub async fn mock_chat_completion_with_header(
        &mut self,
        header: &str,
        value: Matcher,
        hits: usize,
    ) -> Mock {
        self.server
            .mock("POST", CHAT_PATH)
            .match_header(header, value)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_completion_body("cmpl-1"))
            .expect(hits)
            .create_async()
            .await
    }

    /// Server-sent events response.
    pub async fn mock_event_stream(&mut self, hits: usize) -> Mock {
        self.server
            .mock("POST", CHAT_PATH)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: {\"choices\":[]}\n\ndata: [DONE]\n\n")
            .expect(hits)
            .create_async()
            .await
    }

    /// Any method on `path` answering `status` with a JSON error body.
    pub async fn mock_status(&mut self, method: &str, path: &str, status: usize, hits: usize) -> Mock {
        self.server
            .mock(method, path)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(json!({ "error": { "message": "upstream says no" } }).to_string())
            .expect(hits)
            .create_async()
            .await
    }

    /// `GET path` answering 200 with `body`, query string ignored.
    pub async fn mock_get(&mut self, path: &str, body: &str, hits: usize) -> Mock {
        self.server
            .mock("GET", Matcher::Regex(format!("^{path}")))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// Chat completion that stalls for `delay` before answering.
    pub async fn mock_slow_chat_completion(&mut self, delay: Duration) -> Mock {
        self.server
            .mock("POST", CHAT_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(move |w| {
                std::thread::sleep(delay);
                w.write_all(chat_completion_body("cmpl-late").as_bytes())
            })
            .create_async()
            .await
    }
}
