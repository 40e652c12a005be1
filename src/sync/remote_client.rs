//! C6 — Remote Client: stateless transporter to the server's
//! `/sync/batch` and `/sync/health` endpoints (§4.7, §6).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{BatchRequest, BatchResponse};

const BATCH_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors here are transport/protocol-level (§4.7); semantic per-item
/// outcomes travel inside `BatchResponse.processed_items`.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn post_batch(&self, request: BatchRequest) -> Result<BatchResponse>;
    async fn check_connectivity(&self) -> bool;
}

pub struct HttpRemoteClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpRemoteClient {
    pub fn new(api_base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base_url,
        }
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn post_batch(&self, request: BatchRequest) -> Result<BatchResponse> {
        let url = format!("{}/sync/batch", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .timeout(BATCH_TIMEOUT)
            .json(&request)
            .send()
            .await
            .context("sending sync batch")?;

        response
            .error_for_status()
            .context("sync batch returned an error status")?
            .json::<BatchResponse>()
            .await
            .context("decoding sync batch response")
    }

    /// Any 2xx from `GET /sync/health` within a 5-second deadline counts as
    /// reachable; anything else — including a timeout — means offline.
    async fn check_connectivity(&self) -> bool {
        let url = format!("{}/sync/health", self.api_base_url);
        match self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ItemStatus, ProcessedItem};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn check_connectivity_is_true_for_2xx_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sync/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpRemoteClient::new(server.uri());
        assert!(client.check_connectivity().await);
    }

    #[tokio::test]
    async fn check_connectivity_is_false_when_unreachable() {
        // Nothing listens on this port.
        let client = HttpRemoteClient::new("http://127.0.0.1:1".to_string());
        assert!(!client.check_connectivity().await);
    }

    #[tokio::test]
    async fn post_batch_decodes_a_successful_response() {
        let server = MockServer::start().await;
        let body = BatchResponse {
            processed_items: vec![ProcessedItem {
                client_id: "i1".into(),
                server_id: Some("s1".into()),
                status: ItemStatus::Success,
                resolved_data: None,
                error: None,
            }],
            server_timestamp: chrono::Utc::now(),
            checksum_verified: true,
        };
        Mock::given(method("POST"))
            .and(path("/sync/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = HttpRemoteClient::new(server.uri());
        let request = BatchRequest {
            items: vec![],
            client_timestamp: chrono::Utc::now(),
            checksum: "deadbeef".into(),
        };
        let response = client.post_batch(request).await.unwrap();
        assert_eq!(response.processed_items.len(), 1);
        assert!(response.checksum_verified);
    }

    #[tokio::test]
    async fn post_batch_surfaces_an_error_status_as_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/batch"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpRemoteClient::new(server.uri());
        let request = BatchRequest {
            items: vec![],
            client_timestamp: chrono::Utc::now(),
            checksum: "deadbeef".into(),
        };
        assert!(client.post_batch(request).await.is_err());
    }
}
