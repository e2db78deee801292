//! Analysis service client.
//!
//! One POST endpoint per analysis kind, body `{"prompt": "..."}`. The reply is
//! JSON with a single field named after the analysis (`summary`, `category`,
//! `sentiment`).

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{Result, TriageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Summarize,
    Categorize,
    Sentiment,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Summarize => "/api/summarize",
            Endpoint::Categorize => "/api/categorize",
            Endpoint::Sentiment => "/api/sentiment",
        }
    }

    /// Field of the JSON reply that carries the answer.
    pub fn reply_field(self) -> &'static str {
        match self {
            Endpoint::Summarize => "summary",
            Endpoint::Categorize => "category",
            Endpoint::Sentiment => "sentiment",
        }
    }
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    prompt: &'a str,
}

/// The external call boundary handlers go through.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Returns the answer text on a 2xx reply.
    async fn analyze(&self, endpoint: Endpoint, prompt: &str) -> Result<String>;
}

/// reqwest-backed client for the analysis service.
pub struct HttpAnalysisClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TriageError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, endpoint: Endpoint, prompt: &str) -> Result<String> {
        let url = self.url(endpoint);
        let transport = |e: reqwest::Error| TriageError::ExternalService {
            endpoint: endpoint.path().to_string(),
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        };

        let response = self
            .http
            .post(&url)
            .json(&AnalysisRequest { prompt })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TriageError::ExternalService {
                endpoint: endpoint.path().to_string(),
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let body = response.text().await.map_err(transport)?;
        debug!(%url, "analysis service call succeeded");
        Ok(extract_answer(endpoint, &body))
    }
}

/// Pull the answer field out of the reply; fall back to the raw body.
fn extract_answer(endpoint: Endpoint, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get(endpoint.reply_field())?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one request with a canned response; hand back the request body.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let join = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            // ヘッダ + content-length 分のボディを読み切る
            let request_body = loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    let body = &text[split + 4..];
                    if body.len() >= content_length {
                        break body.to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };

            let response = format!(
                "{status_line}\r\n\
                 content-type: application/json\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request_body
        });

        (format!("http://{addr}"), join)
    }

    fn client(base_url: String) -> HttpAnalysisClient {
        HttpAnalysisClient::new(&AnalysisConfig {
            base_url,
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn posts_prompt_and_extracts_answer() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"category":"High Priority"}"#).await;

        let answer = client(base)
            .analyze(Endpoint::Categorize, "urgent: server down")
            .await
            .unwrap();
        assert_eq!(answer, "High Priority");

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request, serde_json::json!({"prompt": "urgent: server down"}));
    }

    #[tokio::test]
    async fn non_success_status_is_external_service_error() {
        let (base, _server) =
            serve_once("HTTP/1.1 500 Internal Server Error", r#"{"detail":"boom"}"#).await;

        let err = client(base)
            .analyze(Endpoint::Summarize, "text")
            .await
            .unwrap_err();
        match err {
            TriageError::ExternalService { endpoint, status, message } => {
                assert_eq!(endpoint, "/api/summarize");
                assert_eq!(status, Some(500));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        // bind then drop to get a port nobody listens on
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        let err = client(format!("http://{addr}"))
            .analyze(Endpoint::Sentiment, "text")
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::ExternalService { status: None, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn answer_falls_back_to_raw_body() {
        assert_eq!(extract_answer(Endpoint::Summarize, r#"{"summary":"short"}"#), "short");
        assert_eq!(extract_answer(Endpoint::Summarize, "plain text\n"), "plain text");
        assert_eq!(extract_answer(Endpoint::Sentiment, r#"{"other":1}"#), r#"{"other":1}"#);
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let c = client("http://localhost:8000/".to_string());
        assert_eq!(c.url(Endpoint::Sentiment), "http://localhost:8000/api/sentiment");
    }
}
