// HTTP webhook sender (reqwest)
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use coursework_core::port::{WebhookEnvelope, WebhookError, WebhookSender};

pub struct HttpWebhookSender {
    client: Client,
}

impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coursework/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post(&self, url: &str, envelope: &WebhookEnvelope) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| WebhookError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WebhookError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(url = %url, job_id = %envelope.job_id, status = %status, "Webhook accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursework_core::domain::JobStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn envelope() -> WebhookEnvelope {
        WebhookEnvelope {
            job_id: "job-1".to_string(),
            status: JobStatus::Failed,
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            result: None,
            error: Some("Planning structure failed: boom".to_string()),
        }
    }

    /// One-shot HTTP server; returns the URL and a handle yielding the raw request
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });

        (url, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    #[tokio::test]
    async fn test_post_sends_camel_case_json() {
        let (url, server) =
            serve_once("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").await;

        HttpWebhookSender::new(Duration::from_secs(5))
            .post(&url, &envelope())
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains("\"jobId\":\"job-1\""));
        assert!(request.contains("\"status\":\"failed\""));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let (url, server) = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope",
        )
        .await;

        let err = HttpWebhookSender::new(Duration::from_secs(5))
            .post(&url, &envelope())
            .await
            .unwrap_err();

        server.await.unwrap();
        match err {
            WebhookError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        drop(listener);

        let err = HttpWebhookSender::new(Duration::from_secs(2))
            .post(&url, &envelope())
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::Request(_)));
    }
}
