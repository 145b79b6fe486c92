use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;

use crate::{codes, CoordinatorOptions, Envelope, HttpMethod, TransportError};

/// Performs the HTTP exchange for one attempt.
///
/// Implementations must not retry on their own; the coordinator owns the
/// retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: HttpMethod,
        path: &[String],
        params: &serde_json::Value,
    ) -> Result<Envelope, TransportError>;
}

/// reqwest-backed transport rooted at a base URL.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpTransport {
    /// Builds the underlying HTTP client.
    pub fn new(options: &CoordinatorOptions) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::NotSent {
                message: err.to_string(),
            })?;
        Ok(Self::with_client(http, options))
    }

    /// Wraps an already configured client.
    pub fn with_client(http: reqwest::Client, options: &CoordinatorOptions) -> Self {
        Self {
            http,
            base_url: options.base_url.clone(),
            timeout: Duration::from_millis(options.timeout_ms),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, path: &[String]) -> String {
        join_url(&self.base_url, &path.join("/"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: HttpMethod,
        path: &[String],
        params: &serde_json::Value,
    ) -> Result<Envelope, TransportError> {
        let url = self.endpoint_url(path);
        let mut builder = self
            .http
            .request(to_reqwest_method(method), &url)
            .header(header::ACCEPT, "application/json")
            .timeout(self.timeout);

        builder = if method.params_in_query() {
            builder.query(&query_pairs(params))
        } else {
            builder.json(params)
        };

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(classify_reqwest_error)?;
        serde_json::from_str::<Envelope>(&body).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::debug!(%url, body = %body, "response body is not an envelope");
            TransportError::NotSent {
                message: format!("invalid response envelope: {err}"),
            }
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Flattens a JSON object into query pairs. Nested values are sent as
/// their JSON text; `null` entries are skipped.
fn query_pairs(params: &serde_json::Value) -> Vec<(String, String)> {
    let serde_json::Value::Object(map) = params else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if let Some(status) = err.status() {
        return TransportError::Status {
            status: status.as_u16(),
        };
    }
    if err.is_builder() {
        return TransportError::NotSent {
            message: err.to_string(),
        };
    }
    if err.is_timeout() {
        return TransportError::NoResponse {
            code: Some("ETIMEDOUT".to_owned()),
        };
    }
    if err.is_connect() {
        return TransportError::NoResponse {
            code: Some(connect_error_code(&error_chain(&err)).to_owned()),
        };
    }
    if err.is_request() || err.is_body() {
        return TransportError::NoResponse {
            code: codes::find_network_code(&error_chain(&err)).map(str::to_owned),
        };
    }
    TransportError::NotSent {
        message: err.to_string(),
    }
}

/// Debug text of an error and every source below it.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = format!("{err:?}");
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    text
}

/// Socket code for a failed connect, read from the error text. Resolver
/// failures are `ENOTFOUND`; anything unrecognised is `ECONNREFUSED`.
fn connect_error_code(detail: &str) -> &'static str {
    if let Some(code) = codes::find_network_code(detail) {
        return code;
    }
    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
        return "ENOTFOUND";
    }
    "ECONNREFUSED"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{connect_error_code, join_url, query_pairs};

    #[test]
    fn connect_error_code_prefers_codes_in_the_chain() {
        assert_eq!(
            connect_error_code("error sending request: ConnectError(\"tcp connect error\", ECONNRESET)"),
            "ECONNRESET"
        );
        assert_eq!(
            connect_error_code("ConnectError(\"dns error\"): failed to lookup address information"),
            "ENOTFOUND"
        );
        assert_eq!(
            connect_error_code("ConnectError(\"tcp connect error\"): Connection refused (os error 111)"),
            "ECONNREFUSED"
        );
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("http://localhost:1024/oztf/api/v1/", "staff/info"),
            "http://localhost:1024/oztf/api/v1/staff/info"
        );
        assert_eq!(join_url("http://api", "/initial"), "http://api/initial");
    }

    #[test]
    fn query_pairs_flatten_scalars() {
        let pairs = query_pairs(&json!({"page": 2, "name": "kit", "skip": null, "tags": ["a"]}));
        assert!(pairs.contains(&("page".to_owned(), "2".to_owned())));
        assert!(pairs.contains(&("name".to_owned(), "kit".to_owned())));
        assert!(pairs.contains(&("tags".to_owned(), "[\"a\"]".to_owned())));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn query_pairs_ignore_non_objects() {
        assert!(query_pairs(&json!([1, 2])).is_empty());
    }
}
