//! Network transport used to fetch snapshots and deliver event batches.
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{StatusCode, Url};

use crate::{Error, Result, SdkMetadata};

/// Server endpoints used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Fetch an evaluation snapshot. Body: `{user, gatekitMetadata}`.
    Initialize,
    /// Deliver a batch of events. Body: `{events, gatekitMetadata}`.
    LogEvent,
}

impl Endpoint {
    /// Path of the endpoint relative to the base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Initialize => "initialize",
            Endpoint::LogEvent => "log_event",
        }
    }
}

/// Performs network calls on behalf of the client.
///
/// Calls are made from background threads, never from the thread calling into
/// [`Client`](crate::Client). Any transport-level failure or non-success response must be
/// reported as an `Err`; the client treats it as an opaque failure and does not retry.
pub trait Transport: Send + Sync {
    /// POST `body` to `endpoint`, returning the decoded response body (`Value::Null` if empty).
    fn post(&self, endpoint: Endpoint, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Default [`Transport`] talking JSON over HTTP.
pub struct HttpTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    initialize_url: Url,
    log_event_url: Url,
    api_key: String,
    /// If we receive a 401 Unauthorized error during a request, it means the API key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: AtomicBool,
}

impl HttpTransport {
    /// Create a transport for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUrl`] if `base_url` cannot be parsed.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<HttpTransport> {
        let base_url = base_url.trim_end_matches('/');
        let endpoint_url = |endpoint: Endpoint| {
            Url::parse(&format!("{}/{}", base_url, endpoint.path())).map_err(Error::InvalidBaseUrl)
        };

        Ok(HttpTransport {
            client: reqwest::blocking::Client::new(),
            initialize_url: endpoint_url(Endpoint::Initialize)?,
            log_event_url: endpoint_url(Endpoint::LogEvent)?,
            api_key: api_key.into(),
            unauthorized: AtomicBool::new(false),
        })
    }

    fn url(&self, endpoint: Endpoint) -> &Url {
        match endpoint {
            Endpoint::Initialize => &self.initialize_url,
            Endpoint::LogEvent => &self.log_event_url,
        }
    }
}

impl Transport for HttpTransport {
    fn post(&self, endpoint: Endpoint, body: &serde_json::Value) -> Result<serde_json::Value> {
        if self.unauthorized.load(Ordering::Relaxed) {
            return Err(Error::Unauthorized);
        }

        log::debug!(target: "gatekit", endpoint = endpoint.path(); "sending request");
        let response = self
            .client
            .post(self.url(endpoint).clone())
            .header("gatekit-api-key", &self.api_key)
            .header("gatekit-sdk-type", SdkMetadata::SDK_TYPE)
            .header("gatekit-sdk-version", env!("CARGO_PKG_VERSION"))
            .header(
                "gatekit-client-time",
                chrono::Utc::now().timestamp_millis().to_string(),
            )
            .json(body)
            .send()?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED => {
                log::warn!(target: "gatekit", "client is not authorized. Check your API key");
                self.unauthorized.store(true, Ordering::Relaxed);
                return Err(Error::Unauthorized);
            }
            status => {
                log::warn!(target: "gatekit", endpoint = endpoint.path(); "received non-200 response: {:?}", status);
                return Err(Error::UnexpectedStatus(status.as_u16()));
            }
        }

        let text = response.text()?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_endpoint_urls() {
        let transport = HttpTransport::new("https://example.com/v1/", "client-key").unwrap();

        assert_eq!(
            transport.url(Endpoint::Initialize).as_str(),
            "https://example.com/v1/initialize"
        );
        assert_eq!(
            transport.url(Endpoint::LogEvent).as_str(),
            "https://example.com/v1/log_event"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            HttpTransport::new("not a url", "client-key"),
            Err(Error::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn latched_unauthorized_skips_network() {
        let transport = HttpTransport::new("http://127.0.0.1:9", "client-key").unwrap();
        transport.unauthorized.store(true, Ordering::Relaxed);

        assert!(matches!(
            transport.post(Endpoint::LogEvent, &serde_json::Value::Null),
            Err(Error::Unauthorized)
        ));
    }
}
