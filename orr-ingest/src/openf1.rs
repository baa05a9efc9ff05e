//! OpenF1 HTTP provider
//!
//! Issues `GET <base>/<endpoint>?session_key=...` requests and returns the
//! JSON array body. Non-success statuses and transport failures surface as
//! [`ProviderError`]; callers decide whether to skip or abort.

use async_trait::async_trait;
use orr_core::provider::{ProviderError, Query, TelemetryProvider};
use std::time::Duration;

pub struct OpenF1Provider {
    base_url: String,
    http_client: reqwest::Client,
}

impl OpenF1Provider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orr-build/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, query: &Query) -> String {
        format!("{}/{}", self.base_url, query.endpoint.path())
    }
}

#[async_trait]
impl TelemetryProvider for OpenF1Provider {
    fn name(&self) -> &str {
        "OpenF1"
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<serde_json::Value>, ProviderError> {
        let endpoint = query.endpoint;
        let url = self.url(query);
        tracing::debug!("GET {} {:?}", url, query.params());

        let resp = self
            .http_client
            .get(&url)
            .query(&query.params())
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                endpoint,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| ProviderError::Payload {
            endpoint,
            message: e.to_string(),
        })?;

        match body {
            serde_json::Value::Array(records) => Ok(records),
            // OpenF1 answers an empty match with a `{"detail": "No results found."}` object
            serde_json::Value::Object(ref map) if map.contains_key("detail") => {
                tracing::debug!("{} returned no results: {}", endpoint, body);
                Ok(Vec::new())
            }
            other => Err(ProviderError::Payload {
                endpoint,
                message: format!("expected a JSON array, got {}", kind_of(&other)),
            }),
        }
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orr_core::provider::Endpoint;

    #[test]
    fn test_url_joins_endpoint_path() {
        let provider = OpenF1Provider::new("https://api.openf1.org/v1/", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.base_url(), "https://api.openf1.org/v1");
        assert_eq!(
            provider.url(&Query::new(Endpoint::CarData, 9523)),
            "https://api.openf1.org/v1/car_data"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let provider = OpenF1Provider::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = provider
            .fetch(&Query::new(Endpoint::Sessions, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport { endpoint: Endpoint::Sessions, .. }));
    }
}
