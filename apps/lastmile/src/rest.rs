//! Pull-based gateway client. While the realtime session is not ready the
//! consumer polls these endpoints instead of trusting live events. Responses
//! are opaque JSON, consistent with the queue pass-through rule.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{ConfigError, GatewayConfig};

#[derive(Error, Debug)]
pub enum RestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
}

#[async_trait]
trait RestBackend: Send + Sync {
    async fn fetch(&self, url: Url) -> Result<Value, RestError>;
}

struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    fn new() -> Result<Self, RestError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RestBackend for ReqwestBackend {
    async fn fetch(&self, url: Url) -> Result<Value, RestError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RestError::HttpStatus(response.status()));
        }
        Ok(response.json::<Value>().await?)
    }
}

pub struct GatewayRest {
    config: GatewayConfig,
    backend: Arc<dyn RestBackend>,
}

impl GatewayRest {
    pub fn new(config: GatewayConfig) -> Result<Self, RestError> {
        let backend = Arc::new(ReqwestBackend::new()?);
        Ok(Self { config, backend })
    }

    #[cfg(test)]
    fn with_backend(config: GatewayConfig, backend: Arc<dyn RestBackend>) -> Self {
        Self { config, backend }
    }

    /// Aggregate gateway snapshot (drivers, riders, trips, stations).
    pub async fn snapshot(&self) -> Result<Value, RestError> {
        let url = self.config.rest_url("/aggregates/snapshot")?;
        self.backend.fetch(url).await
    }

    /// Queue summary for one driver, same shape as the `driver:rider-queue`
    /// push event.
    pub async fn driver_requests(&self, driver_id: &str) -> Result<Value, RestError> {
        let mut url = self.config.rest_url("/drivers/requests")?;
        url.query_pairs_mut().append_pair("driverId", driver_id);
        self.backend.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingBackend {
        urls: Mutex<Vec<Url>>,
        response: Value,
    }

    impl RecordingBackend {
        fn new(response: Value) -> Self {
            Self {
                urls: Mutex::new(Vec::new()),
                response,
            }
        }
    }

    #[async_trait]
    impl RestBackend for RecordingBackend {
        async fn fetch(&self, url: Url) -> Result<Value, RestError> {
            self.urls.lock().push(url);
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn driver_requests_sets_the_query_parameter() {
        let backend = Arc::new(RecordingBackend::new(json!({ "requests": [] })));
        let config = GatewayConfig::new("http://localhost:8082").unwrap();
        let rest = GatewayRest::with_backend(config, backend.clone());

        let queue = rest.driver_requests("d1").await.unwrap();
        assert_eq!(queue, json!({ "requests": [] }));

        let urls = backend.urls.lock();
        assert_eq!(
            urls[0].as_str(),
            "http://localhost:8082/drivers/requests?driverId=d1"
        );
    }

    #[tokio::test]
    async fn snapshot_hits_the_aggregate_endpoint() {
        let backend = Arc::new(RecordingBackend::new(json!({ "trips": [] })));
        let config = GatewayConfig::new("http://localhost:8082").unwrap();
        let rest = GatewayRest::with_backend(config, backend.clone());

        rest.snapshot().await.unwrap();

        let urls = backend.urls.lock();
        assert_eq!(urls[0].path(), "/aggregates/snapshot");
    }

    #[tokio::test]
    async fn tunnel_configs_decorate_rest_urls() {
        let backend = Arc::new(RecordingBackend::new(json!({})));
        let config = GatewayConfig::new("https://abc.ngrok-free.app").unwrap();
        let rest = GatewayRest::with_backend(config, backend.clone());

        rest.snapshot().await.unwrap();

        let urls = backend.urls.lock();
        assert!(urls[0]
            .query()
            .unwrap()
            .contains("ngrok-skip-browser-warning=true"));
    }
}
