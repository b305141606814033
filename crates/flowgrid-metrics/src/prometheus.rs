//! Prometheus instant-query source.
//!
//! Speaks the `/api/v1/query` HTTP API directly over a hyper HTTP/1.1
//! connection. Only `vector` results are accepted; each series yields one
//! [`RawSample`] carrying its full label set.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http_body_util::BodyExt;
use serde::Deserialize;
use tracing::debug;

use flow_core::config::MetricsConfig;

use crate::error::{MetricsError, MetricsResult};
use crate::source::{MetricsSource, RawSample};

#[derive(Debug, Clone)]
pub struct PrometheusSource {
    /// `host:port` of the server.
    address: String,
    /// Query endpoint, normally `/api/v1/query`.
    path: String,
}

impl PrometheusSource {
    pub fn new(address: &str, path: &str) -> Self {
        Self {
            address: address.to_string(),
            path: path.to_string(),
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(&config.address, &config.path)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Path and query string for one instant query.
    pub fn request_uri(&self, query: &str, at: Option<SystemTime>) -> String {
        let mut uri = format!("{}?query={}", self.path, urlencoding::encode(query));
        if let Some(at) = at {
            let secs = at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            uri.push_str(&format!("&time={secs:.3}"));
        }
        uri
    }

    async fn get(&self, uri: &str) -> MetricsResult<(http::StatusCode, Bytes)> {
        let connect_err = |reason: String| MetricsError::Connect {
            address: self.address.clone(),
            reason,
        };

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| connect_err(format!("handshake failed: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "metrics connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("host", &self.address)
            .header("accept", "application/json")
            .header("user-agent", "flowgrid-metrics/0.1")
            .body(http_body_util::Empty::<Bytes>::new())
            .map_err(|e| MetricsError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| connect_err(format!("request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| connect_err(format!("reading body failed: {e}")))?
            .to_bytes();

        Ok((status, body))
    }
}

impl MetricsSource for PrometheusSource {
    async fn query(&self, query: &str, at: Option<SystemTime>) -> MetricsResult<Vec<RawSample>> {
        let uri = self.request_uri(query, at);
        debug!(address = %self.address, %uri, "querying prometheus");

        let (status, body) = self.get(&uri).await?;

        // Prometheus reports bad queries as 4xx with a JSON error document,
        // so try the body before falling back to the bare status.
        match parse_response(query, &body) {
            Ok(samples) if status.is_success() => Ok(samples),
            Err(e @ MetricsError::Query { .. }) => Err(e),
            Ok(_) | Err(_) if !status.is_success() => Err(MetricsError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).chars().take(512).collect(),
            }),
            other => other,
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Deserialize)]
struct VectorSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Decode an instant-query response body into samples.
pub fn parse_response(query: &str, body: &[u8]) -> MetricsResult<Vec<RawSample>> {
    let resp: QueryResponse =
        serde_json::from_slice(body).map_err(|e| MetricsError::Decode(e.to_string()))?;

    if resp.status != "success" {
        return Err(MetricsError::Query {
            query: query.to_string(),
            reason: format!(
                "{}: {}",
                resp.error_type.as_deref().unwrap_or("error"),
                resp.error.as_deref().unwrap_or("no detail")
            ),
        });
    }

    let data = resp
        .data
        .ok_or_else(|| MetricsError::Decode("missing `data`".to_string()))?;
    if data.result_type != "vector" {
        return Err(MetricsError::Decode(format!(
            "expected vector result, got {}",
            data.result_type
        )));
    }

    let series: Vec<VectorSeries> =
        serde_json::from_value(data.result).map_err(|e| MetricsError::Decode(e.to_string()))?;

    series
        .into_iter()
        .map(|s| {
            let value = s.value.1.parse::<f64>().map_err(|_| {
                MetricsError::Decode(format!("non-numeric sample value \"{}\"", s.value.1))
            })?;
            Ok(RawSample {
                labels: s.metric,
                value,
            })
        })
        .collect()
}
