//! # Ingestion endpoint clients.
//!
//! [`IngestionSink`] is the seam the delivery workers push through;
//! [`HttpIngestionClient`] is the production implementation:
//!
//! ```text
//! POST {base_url}/namespaces/{ns}/dataStreams/{stream}/{version}/dataTenants/{tenant}/{env}/events
//! Content-Type: application/json
//! Authorization: bearer {token}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::config::EndpointConfig;
use crate::error::DeliveryError;

/// Destination of delivered events.
#[async_trait]
pub trait IngestionSink: Send + Sync + 'static {
    /// Sends one request body for `tenant`; `Ok` means the endpoint accepted it.
    async fn send(&self, tenant: &str, body: Vec<u8>) -> Result<(), DeliveryError>;
}

/// HTTP client for the ingestion endpoint.
#[derive(Clone, Debug)]
pub struct HttpIngestionClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl HttpIngestionClient {
    /// Builds a client whose every request is bounded by `request_timeout`.
    pub fn new(endpoint: EndpointConfig, request_timeout: Duration) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { http, endpoint })
    }

    /// Events URL of `tenant`.
    pub fn url(&self, tenant: &str) -> String {
        let ep = &self.endpoint;
        format!(
            "{}/namespaces/{}/dataStreams/{}/{}/dataTenants/{}/{}/events",
            ep.base_url.trim_end_matches('/'),
            ep.namespace,
            ep.data_stream,
            ep.version,
            tenant,
            ep.env
        )
    }
}

#[async_trait]
impl IngestionSink for HttpIngestionClient {
    async fn send(&self, tenant: &str, body: Vec<u8>) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(self.url(tenant))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("bearer {}", self.endpoint.token))
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::from_status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Seen {
        requests: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    async fn serve(status: StatusCode) -> (String, Arc<Seen>) {
        let seen = Arc::new(Seen::default());
        let app = Router::new()
            .route(
                "/namespaces/:ns/dataStreams/:stream/:version/dataTenants/:tenant/:env/events",
                post(
                    move |State(seen): State<Arc<Seen>>,
                          Path((_ns, _stream, _version, tenant, _env)): Path<(
                        String,
                        String,
                        String,
                        String,
                        String,
                    )>,
                          headers: HeaderMap,
                          body: axum::body::Bytes| async move {
                        let auth = headers
                            .get(AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        let json = serde_json::from_slice(&body).unwrap_or_default();
                        seen.requests.lock().push((tenant, auth, json));
                        status
                    },
                ),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn endpoint(base_url: String) -> EndpointConfig {
        EndpointConfig {
            base_url,
            namespace: "kyma".into(),
            data_stream: "consumption-metrics".into(),
            version: "v1".into(),
            env: "dev".into(),
            token: "t0ken".into(),
        }
    }

    #[test]
    fn url_follows_endpoint_layout() {
        let client =
            HttpIngestionClient::new(endpoint("https://ingest.example.com/".into()), Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.url("sa-1"),
            "https://ingest.example.com/namespaces/kyma/dataStreams/consumption-metrics/v1/dataTenants/sa-1/dev/events"
        );
    }

    #[tokio::test]
    async fn posts_json_with_bearer_token() {
        let (base, seen) = serve(StatusCode::CREATED).await;
        let client = HttpIngestionClient::new(endpoint(base), Duration::from_secs(5)).unwrap();

        client
            .send("sa-1", br#"{"timestamp":"2024-01-01T00:00:00Z"}"#.to_vec())
            .await
            .unwrap();

        let requests = seen.requests.lock();
        assert_eq!(requests.len(), 1);
        let (tenant, auth, json) = &requests[0];
        assert_eq!(tenant, "sa-1");
        assert_eq!(auth, "bearer t0ken");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn maps_rejections_to_error_kinds() {
        for (status, label) in [
            (StatusCode::BAD_REQUEST, "delivery_bad_request"),
            (StatusCode::NOT_FOUND, "delivery_missing_parameters"),
            (StatusCode::PAYLOAD_TOO_LARGE, "delivery_payload_too_large"),
            (StatusCode::INTERNAL_SERVER_ERROR, "delivery_unexpected_status"),
        ] {
            let (base, _seen) = serve(status).await;
            let client = HttpIngestionClient::new(endpoint(base), Duration::from_secs(5)).unwrap();
            let err = client.send("sa-1", b"{}".to_vec()).await.unwrap_err();
            assert_eq!(err.as_label(), label);
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            HttpIngestionClient::new(endpoint(format!("http://{addr}")), Duration::from_secs(5))
                .unwrap();
        let err = client.send("sa-1", b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
