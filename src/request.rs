//! High level request orchestration.
//!
//! Wires together throttling, cached challenge cookies, HEAD-based domain
//! resolution, and failure classification around a
//! [`ChallengeSolvingClient`]. Callers always get a response-shaped value
//! back; what went wrong is reported through events and [`Request::last_error`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use url::Url;

use crate::challenges::core::{
	ChallengeSolvingClient, FailureKind, HttpResponse, ReqwestSolvingClient, RequestDescriptor,
	SolverError, origin_from_url,
};
use crate::config::{ConfigError, RequestConfig};
use crate::modules::domain_cache::{DOMAIN_MARKER_HEADER, DomainCache};
use crate::modules::events::{
	CookieEvent, EventDispatcher, EventHandler, FailureEvent, LoggingHandler, RequestEvent,
	RequestLayerEvent, RetryEvent,
};
use crate::modules::head_check::{HeadCheckMemo, HeadProbe, HeadResolver};
use crate::modules::ttl_cache::TtlCache;

/// Result alias used for construction.
pub type RequestResult<T> = Result<T, RequestError>;

/// Memo of `head` answers keyed by the URL asked about.
pub type HeadCache = TtlCache<String, (String, u16)>;

/// Errors raised while setting up a [`Request`]. Calls themselves never fail.
#[derive(Debug, Error)]
pub enum RequestError {
	#[error("http client initialisation failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

/// One candidate site mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
	pub base: String,
	pub search: String,
	pub default_search: String,
}

impl UrlParts {
	pub fn new(
		base: impl Into<String>,
		search: impl Into<String>,
		default_search: impl Into<String>,
	) -> Self {
		Self {
			base: base.into(),
			search: search.into(),
			default_search: default_search.into(),
		}
	}

	fn with_base(&self, base: String) -> Self {
		Self {
			base,
			search: self.search.clone(),
			default_search: self.default_search.clone(),
		}
	}
}

/// Fluent builder for [`Request`].
pub struct RequestBuilder {
	config: RequestConfig,
	client: Option<Arc<dyn ChallengeSolvingClient>>,
	head_client: Option<Arc<dyn ChallengeSolvingClient>>,
	head_memo: Option<HeadCheckMemo>,
	head_cache: Option<HeadCache>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl RequestBuilder {
	pub fn new() -> Self {
		Self {
			config: RequestConfig::default(),
			client: None,
			head_client: None,
			head_memo: None,
			head_cache: None,
			handlers: Vec::new(),
		}
	}

	pub fn with_config(mut self, config: RequestConfig) -> Self {
		self.config = config;
		self
	}

	pub fn sequential(mut self, sequential: bool) -> Self {
		self.config.sequential = sequential;
		self
	}

	pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.config.timeout = timeout;
		self
	}

	pub fn with_wait(mut self, wait: std::time::Duration) -> Self {
		self.config.wait = wait;
		self
	}

	pub fn with_challenge_retries(mut self, retries: u32) -> Self {
		self.config.challenge_retries = retries;
		self
	}

	pub fn with_cache_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
		self.config.cache_path = path.into();
		self
	}

	pub fn skip_head(mut self, skip: bool) -> Self {
		self.config.skip_head = skip;
		self
	}

	/// Client used for page requests. Also used for HEAD probes unless
	/// [`with_head_client`](Self::with_head_client) is given.
	pub fn with_client(mut self, client: Arc<dyn ChallengeSolvingClient>) -> Self {
		self.client = Some(client);
		self
	}

	pub fn with_head_client(mut self, client: Arc<dyn ChallengeSolvingClient>) -> Self {
		self.head_client = Some(client);
		self
	}

	/// Share HEAD resolution results with other instances.
	pub fn with_head_memo(mut self, memo: HeadCheckMemo) -> Self {
		self.head_memo = Some(memo);
		self
	}

	pub fn with_head_cache(mut self, cache: HeadCache) -> Self {
		self.head_cache = Some(cache);
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn build(self) -> RequestResult<Request> {
		let config = self.config;
		let custom_client = self.client.is_some();

		let client: Arc<dyn ChallengeSolvingClient> = match self.client {
			Some(client) => client,
			None => Arc::new(match config.user_agent {
				Some(ref agent) => ReqwestSolvingClient::with_user_agent(agent.clone())?,
				None => ReqwestSolvingClient::new()?,
			}),
		};
		let head_client = match self.head_client {
			Some(head_client) => head_client,
			None if custom_client => client.clone(),
			None => Arc::new(ReqwestSolvingClient::new()?),
		};

		let resolver = HeadResolver::new(self.head_memo.unwrap_or_default(), config.max_redirect_hops);
		resolver.set_skip_head(config.skip_head);

		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		for handler in self.handlers {
			events.register_handler(handler);
		}

		Ok(Request {
			domain_cache: DomainCache::new(config.cache_path.clone(), config.lock_timeout),
			head_cache: self
				.head_cache
				.unwrap_or_else(|| TtlCache::new(config.head_cache_ttl)),
			config,
			client,
			head_client,
			resolver,
			events,
			throttle: Mutex::new(false),
			last_error: std::sync::Mutex::new(String::new()),
		})
	}
}

impl Default for RequestBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// How a single logical call ended.
enum CallOutcome {
	/// A real response, possibly with an error status.
	Completed(HttpResponse),
	/// No response at all; carries the synthetic 501 placeholder.
	Failed(HttpResponse),
}

impl CallOutcome {
	fn into_response(self) -> HttpResponse {
		match self {
			CallOutcome::Completed(response) | CallOutcome::Failed(response) => response,
		}
	}
}

enum AttemptError {
	Status(HttpResponse),
	Solver(SolverError),
}

/// Polite, challenge-aware request executor.
pub struct Request {
	config: RequestConfig,
	client: Arc<dyn ChallengeSolvingClient>,
	head_client: Arc<dyn ChallengeSolvingClient>,
	domain_cache: DomainCache,
	resolver: HeadResolver,
	head_cache: HeadCache,
	events: EventDispatcher,
	/// Held across a whole sequential call; `true` once one has run.
	throttle: Mutex<bool>,
	last_error: std::sync::Mutex<String>,
}

impl Request {
	/// Construct an executor with default configuration.
	pub fn new() -> RequestResult<Self> {
		RequestBuilder::new().build()
	}

	/// Obtain a builder to customise the executor.
	pub fn builder() -> RequestBuilder {
		RequestBuilder::new()
	}

	pub fn with_config(config: RequestConfig) -> RequestResult<Self> {
		RequestBuilder::new().with_config(config).build()
	}

	pub fn config(&self) -> &RequestConfig {
		&self.config
	}

	pub fn domain_cache(&self) -> &DomainCache {
		&self.domain_cache
	}

	pub fn head_memo(&self) -> &HeadCheckMemo {
		self.resolver.memo()
	}

	/// Message describing why the most recent call failed; empty on success.
	pub fn last_error(&self) -> String {
		match self.last_error.lock() {
			Ok(guard) => guard.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	pub fn set_skip_head(&self, skip: bool) {
		self.resolver.set_skip_head(skip);
	}

	/// Resolve `url` to its live location and status.
	pub async fn head(&self, url: &str) -> (String, u16) {
		if self.resolver.skip_head() {
			return (url.to_string(), 200);
		}

		self.head_cache
			.get_or_compute(url.to_string(), || self.resolver.resolve(url, self))
			.await
	}

	/// First mirror whose base URL resolves to a live origin.
	pub async fn find_url(&self, urls: &[UrlParts]) -> Option<UrlParts> {
		for parts in urls {
			let (resolved, status) = self.head(&parts.base).await;
			if status != 200 {
				continue;
			}

			let base = resolved.strip_suffix('/').unwrap_or(&resolved).to_string();
			return Some(parts.with_base(base));
		}

		None
	}

	/// GET `url` with no extra headers, following redirects.
	pub async fn get(&self, url: &str) -> Option<HttpResponse> {
		self.get_with(url, HeaderMap::new(), true).await
	}

	/// GET `url` against its resolved origin. `None` when the origin is not
	/// reachable.
	pub async fn get_with(
		&self,
		url: &str,
		headers: HeaderMap,
		allow_redirects: bool,
	) -> Option<HttpResponse> {
		let parsed = match Url::parse(url) {
			Ok(parsed) => parsed,
			Err(err) => {
				self.reject_url(url, err);
				return None;
			}
		};

		let (resolved, status) = self.head(&origin_from_url(&parsed)).await;
		if status != 200 {
			return None;
		}

		let target = match rebase(&parsed, &resolved) {
			Some(target) => target,
			None => {
				log::warn!("resolved origin {resolved} for {url} is not a valid url");
				return None;
			}
		};

		self.announce(Method::GET, &target);
		let descriptor = RequestDescriptor::new(Method::GET, target, self.config.timeout)
			.with_headers(headers)
			.with_allow_redirects(allow_redirects);

		let outcome = self
			.execute(self.client.as_ref(), descriptor, self.config.sequential)
			.await;
		Some(outcome.into_response())
	}

	/// POST `data` to `url` without domain resolution.
	pub async fn post(&self, url: &str, data: impl Into<Bytes>, headers: HeaderMap) -> HttpResponse {
		let target = match Url::parse(url) {
			Ok(target) => target,
			Err(err) => {
				self.reject_url(url, err);
				return HttpResponse::synthetic_failure(None);
			}
		};

		self.announce(Method::POST, &target);
		let descriptor = RequestDescriptor::new(Method::POST, target, self.config.timeout)
			.with_headers(headers)
			.with_body(data);

		self.execute(self.client.as_ref(), descriptor, self.config.sequential)
			.await
			.into_response()
	}

	/// Run one logical call, re-running it while fresh challenges keep coming
	/// and the retry budget lasts.
	async fn execute(
		&self,
		client: &dyn ChallengeSolvingClient,
		descriptor: RequestDescriptor,
		sequential: bool,
	) -> CallOutcome {
		let mut retries_left = self.config.challenge_retries;

		loop {
			self.set_last_error(String::new());

			match self.attempt(client, &descriptor, sequential).await {
				Ok(response) => return CallOutcome::Completed(response),
				Err(AttemptError::Status(response)) => {
					self.record_failure(&descriptor.url, FailureKind::from_status(response.status()));
					return CallOutcome::Completed(response);
				}
				Err(AttemptError::Solver(error)) => {
					let kind = FailureKind::classify(&error);
					if kind.is_retryable() && retries_left > 0 {
						retries_left -= 1;
						self.events.dispatch(RequestLayerEvent::Retry(RetryEvent {
							url: descriptor.url.clone(),
							retries_left,
							timestamp: chrono::Utc::now(),
						}));
						continue;
					}

					self.record_failure(&descriptor.url, kind);
					return CallOutcome::Failed(HttpResponse::synthetic_failure(Some(&descriptor.url)));
				}
			}
		}
	}

	async fn attempt(
		&self,
		client: &dyn ChallengeSolvingClient,
		descriptor: &RequestDescriptor,
		sequential: bool,
	) -> Result<HttpResponse, AttemptError> {
		if !sequential {
			let response = descriptor
				.execute(client)
				.await
				.map_err(AttemptError::Solver)?;
			return verify(response);
		}

		let (prepared, result) = {
			let mut has_run = self.throttle.lock().await;
			if *has_run {
				sleep(self.config.wait).await;
			}
			*has_run = true;
			// Read after the wait so cookies stored by the previous call are replayed.
			let prepared = self.with_cached_headers(descriptor).await;
			let result = prepared.execute(client).await;
			(prepared, result)
		};

		let response = verify(result.map_err(AttemptError::Solver)?)?;
		if let Some(ref domain) = prepared.cache_domain {
			self.persist_cookies(domain, &response).await;
		}
		Ok(response)
	}

	/// Copy of `descriptor` carrying the cached header set for its origin.
	async fn with_cached_headers(&self, descriptor: &RequestDescriptor) -> RequestDescriptor {
		let mut prepared = descriptor.clone();
		let domain = origin_from_url(&descriptor.url);

		for (name, value) in self.domain_cache.headers_for(&domain).await {
			// The marker rides on the descriptor, not on the wire.
			if name == DOMAIN_MARKER_HEADER {
				continue;
			}
			match (
				HeaderName::from_bytes(name.as_bytes()),
				HeaderValue::from_str(&value),
			) {
				(Ok(name), Ok(value)) => {
					prepared.headers.insert(name, value);
				}
				_ => log::debug!("skipping unusable cached header {name} for {domain}"),
			}
		}

		prepared.cache_domain = Some(domain);
		prepared
	}

	async fn persist_cookies(&self, domain: &str, response: &HttpResponse) {
		let session = self.client.cookies(response.url());
		let result = self
			.domain_cache
			.save_cookies_from_challenge(domain, response, session)
			.await;

		let (stored, error) = match result {
			Ok(stored) => (stored, None),
			Err(err) => (false, Some(err.to_string())),
		};
		self.events.dispatch(RequestLayerEvent::Cookies(CookieEvent {
			domain: domain.to_string(),
			stored,
			error,
			timestamp: chrono::Utc::now(),
		}));
	}

	fn announce(&self, method: Method, url: &Url) {
		self.events.dispatch(RequestLayerEvent::Request(RequestEvent {
			method,
			url: url.clone(),
			timestamp: chrono::Utc::now(),
		}));
	}

	fn record_failure(&self, url: &Url, kind: FailureKind) {
		self.set_last_error(kind.message());
		self.events.dispatch(RequestLayerEvent::Failure(FailureEvent {
			url: url.clone(),
			kind,
			timestamp: chrono::Utc::now(),
		}));
	}

	fn reject_url(&self, url: &str, err: url::ParseError) {
		let message = FailureKind::Unclassified(format!("invalid url {url:?}: {err}")).message();
		log::warn!("{message}");
		self.set_last_error(message);
	}

	fn set_last_error(&self, message: String) {
		match self.last_error.lock() {
			Ok(mut guard) => *guard = message,
			Err(poisoned) => *poisoned.into_inner() = message,
		}
	}
}

#[async_trait]
impl HeadProbe for Request {
	async fn probe(&self, origin: &Url) -> Option<HttpResponse> {
		self.announce(Method::HEAD, origin);
		let descriptor = RequestDescriptor::new(Method::HEAD, origin.clone(), self.config.head_timeout)
			.with_allow_redirects(false);

		match self.execute(self.head_client.as_ref(), descriptor, false).await {
			CallOutcome::Completed(response) => Some(response),
			CallOutcome::Failed(_) => None,
		}
	}
}

fn verify(response: HttpResponse) -> Result<HttpResponse, AttemptError> {
	if response.status() >= 400 {
		Err(AttemptError::Status(response))
	} else {
		Ok(response)
	}
}

/// `original` with its scheme, host, and port taken from `resolved`.
fn rebase(original: &Url, resolved: &str) -> Option<Url> {
	let mut target = Url::parse(resolved).ok()?;
	if !target.has_host() {
		return None;
	}
	target.set_path(original.path());
	target.set_query(original.query());
	target.set_fragment(original.fragment());
	Some(target)
}
