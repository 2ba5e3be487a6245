//! Contract for the HTTP client that sits in front of anti-bot challenges.
//!
//! The executor never solves challenges itself. It dispatches requests through
//! a [`ChallengeSolvingClient`] and relies on the client reporting failures as
//! distinguishable [`SolverError`] variants so they can be classified.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use thiserror::Error;
use url::Url;

use super::types::{HttpResponse, RequestDescriptor};

/// Failures surfaced by a solving client.
///
/// The display strings follow the wording used by the Python Cloudscraper
/// family so transport errors wrapped from other clients classify the same way.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("Detected the new Cloudflare challenge.")]
    NewChallenge,
    #[error("Cloudflare challenge could not be solved: {0}")]
    Cloudflare(String),
    #[error("!!Loop Protection!! {0}")]
    LoopProtection(String),
    #[error("Max retries exceeded with url: {0}")]
    MaxRetries(String),
    #[error("ConnectTimeout: {0}")]
    ConnectTimeout(String),
    #[error("ReadTimeout: {0}")]
    ReadTimeout(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// HTTP client able to get past anti-bot interstitials.
///
/// Implementations keep a session (cookie jar) across calls so cookies earned
/// by solving a challenge are replayed on later requests.
#[async_trait]
pub trait ChallengeSolvingClient: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor) -> Result<HttpResponse, SolverError>;

    /// Cookies currently held by the client's session for `url`.
    fn cookies(&self, _url: &Url) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn head(&self, url: Url, timeout: Duration) -> Result<HttpResponse, SolverError> {
        let request =
            RequestDescriptor::new(Method::HEAD, url, timeout).with_allow_redirects(false);
        self.execute(&request).await
    }

    async fn post(
        &self,
        url: Url,
        data: Bytes,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<HttpResponse, SolverError> {
        let request = RequestDescriptor::new(Method::POST, url, timeout)
            .with_headers(headers)
            .with_body(data);
        self.execute(&request).await
    }
}
