//! OpenSearch client implementation.

use crate::bulk::{bulk_lines, parse_bulk_response};
use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    http::StatusCode,
    BulkParts, OpenSearch,
};
use search_sink::{OperationResult, SearchSink, SinkError};
use serde_json::Value;
use std::time::Duration;
use sync_core::IndexOperation;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct OpenSearchSinkConfig {
    /// Engine URL, e.g. `http://localhost:9200`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

/// [`SearchSink`] over the OpenSearch/Elasticsearch `_bulk` API.
pub struct OpenSearchSink {
    client: OpenSearch,
}

impl OpenSearchSink {
    /// Build a client for a single node. No request is made.
    pub fn new(config: &OpenSearchSinkConfig) -> Result<Self, SinkError> {
        let url = Url::parse(&config.url)
            .map_err(|e| SinkError::Protocol(format!("invalid index url '{}': {e}", config.url)))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.timeout);
        if let Some(username) = &config.username {
            builder = builder.auth(Credentials::Basic(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }
        let transport = builder
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        info!(url = %config.url, "Created OpenSearch client");

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }
}

/// Classify a non-success HTTP status of a whole request.
fn status_error(status: StatusCode, body: String) -> SinkError {
    let code = status.as_u16();
    match code {
        401 | 403 => SinkError::Authentication(format!("status {code}: {body}")),
        429 | 500..=599 => SinkError::Transport(format!("status {code}: {body}")),
        _ => SinkError::Protocol(format!("status {code}: {body}")),
    }
}

#[async_trait]
impl SearchSink for OpenSearchSink {
    async fn ping(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        Ok(())
    }

    async fn bulk(&self, ops: &[IndexOperation]) -> Result<Vec<OperationResult>, SinkError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        let body: Vec<JsonBody<Value>> = bulk_lines(ops).into_iter().map(JsonBody::from).collect();

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Bulk request failed");
            return Err(status_error(status, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SinkError::Transport(format!("reading bulk response: {e}")))?;
        let results = parse_bulk_response(ops, &body)?;

        debug!(
            count = ops.len(),
            failed = results.iter().filter(|r| !r.is_applied()).count(),
            "Bulk request applied"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new()),
            SinkError::Authentication(_)
        ));
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(status_error(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad".into()),
            SinkError::Protocol(_)
        ));
    }

    #[test]
    fn test_rejects_invalid_url() {
        let config = OpenSearchSinkConfig {
            url: "not a url".into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
        };
        assert!(OpenSearchSink::new(&config).is_err());
    }
}
