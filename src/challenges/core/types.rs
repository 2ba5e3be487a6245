//! Core data structures shared by the detector, the solving client, and the
//! request executor.

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use once_cell::sync::Lazy;
use url::Url;

use super::client::{ChallengeSolvingClient, SolverError};

/// Status reported by synthetic responses produced when a call fails outright.
pub const SYNTHETIC_FAILURE_STATUS: u16 = 501;

static BLANK_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("about:blank").expect("about:blank is a valid url"));

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
    url: Url,
    request_headers: HeaderMap,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HeaderMap, body: Bytes, url: Url) -> Self {
        Self {
            status,
            headers,
            body,
            url,
            request_headers: HeaderMap::new(),
        }
    }

    /// Attach the headers that were actually sent for this response.
    pub fn with_request_headers(mut self, headers: HeaderMap) -> Self {
        self.request_headers = headers;
        self
    }

    /// Response-shaped placeholder returned when no real response exists.
    pub fn synthetic_failure(url: Option<&Url>) -> Self {
        Self::new(
            SYNTHETIC_FAILURE_STATUS,
            HeaderMap::new(),
            Bytes::new(),
            url.cloned().unwrap_or_else(|| BLANK_URL.clone()),
        )
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Headers of the request that produced this response.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// A single request to dispatch through a [`ChallengeSolvingClient`].
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
    pub allow_redirects: bool,
    /// Origin whose cached header set was injected; set only for sequential calls.
    pub cache_domain: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout,
            allow_redirects: true,
            cache_domain: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    pub async fn execute(
        &self,
        client: &dyn ChallengeSolvingClient,
    ) -> Result<HttpResponse, SolverError> {
        client.execute(self).await
    }
}
