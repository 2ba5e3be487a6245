//! Reqwest-based implementation of the `ChallengeSolvingClient` trait.
//!
//! Provides a thin adapter around `reqwest::Client` that keeps a shared cookie
//! jar, converts transport failures into [`SolverError`] variants, and reports
//! challenge pages it cannot get past instead of handing them back as content.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::USER_AGENT;
use http::{HeaderMap, HeaderValue};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, redirect::Policy};
use url::Url;

use super::analysis::{is_iuam_challenge, is_new_challenge};
use super::client::{ChallengeSolvingClient, SolverError};
use super::types::{HttpResponse, RequestDescriptor};
use crate::challenges::user_agents::{browser_headers, random_user_agent};

const MAX_REDIRECTS: usize = 10;

/// Reqwest-backed client with a persistent cookie session.
///
/// Two underlying clients share one jar: reqwest fixes the redirect policy per
/// client, and descriptors choose per request whether redirects are followed.
pub struct ReqwestSolvingClient {
    following: Client,
    manual: Client,
    jar: Arc<Jar>,
    user_agent: String,
}

impl ReqwestSolvingClient {
    /// Client identifying as a random desktop browser.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_user_agent(random_user_agent(false))
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Result<Self, reqwest::Error> {
        let user_agent = user_agent.into();
        let jar = Arc::new(Jar::default());
        let base_headers = browser_headers(&user_agent);

        let following = Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .cookie_provider(jar.clone())
            .default_headers(base_headers.clone())
            .build()?;
        let manual = Client::builder()
            .redirect(Policy::none())
            .cookie_provider(jar.clone())
            .default_headers(base_headers)
            .build()?;

        Ok(Self {
            following,
            manual,
            jar,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn outgoing_headers(&self, request: &RequestDescriptor) -> HeaderMap {
        let mut headers = request.headers.clone();
        if !headers.contains_key(USER_AGENT)
            && let Ok(value) = HeaderValue::from_str(&self.user_agent)
        {
            headers.insert(USER_AGENT, value);
        }
        headers
    }
}

#[async_trait]
impl ChallengeSolvingClient for ReqwestSolvingClient {
    async fn execute(&self, request: &RequestDescriptor) -> Result<HttpResponse, SolverError> {
        let client = if request.allow_redirects {
            &self.following
        } else {
            &self.manual
        };
        let headers = self.outgoing_headers(request);

        let mut builder = client
            .request(request.method.clone(), request.url.as_str())
            .headers(headers.clone())
            .timeout(request.timeout);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| map_error(err, &request.url))?;

        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| map_error(err, &request.url))?;

        let response = HttpResponse::new(status, response_headers, body, url)
            .with_request_headers(headers);

        if is_new_challenge(&response) {
            return Err(SolverError::NewChallenge);
        }
        if is_iuam_challenge(&response, false) {
            return Err(SolverError::Cloudflare(format!(
                "IUAM interstitial at {} needs an external solver",
                response.url()
            )));
        }

        Ok(response)
    }

    fn cookies(&self, url: &Url) -> Vec<(String, String)> {
        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
            .map(|raw| parse_cookie_pairs(&raw))
            .unwrap_or_default()
    }
}

fn map_error(err: reqwest::Error, url: &Url) -> SolverError {
    if err.is_timeout() {
        if err.is_connect() {
            SolverError::ConnectTimeout(err.to_string())
        } else {
            SolverError::ReadTimeout(err.to_string())
        }
    } else if err.is_connect() {
        SolverError::MaxRetries(format!("{url} ({err})"))
    } else if err.is_redirect() {
        SolverError::LoopProtection(err.to_string())
    } else {
        SolverError::Transport(err.to_string())
    }
}

fn parse_cookie_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (!name.is_empty()).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}
