//! Persistent per-domain header cache.
//!
//! Cookies earned by getting past a challenge are worth reusing across process
//! invocations. They live in one JSON document keyed by origin:
//!
//! ```json
//! {
//!     "https://example.com": {
//!         "Cookie": "cf_clearance=...",
//!         "User-Agent": "Mozilla/5.0 ...",
//!         "X-Domain": "https://example.com"
//!     }
//! }
//! ```
//!
//! Keys are kept sorted so the file diffs cleanly. Every read-merge-write cycle
//! runs under a [`SoftLock`] shared with other processes using the same file.

pub mod cookies;

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use http::header::{COOKIE, SET_COOKIE, USER_AGENT};
use serde::Serialize;
use thiserror::Error;

use crate::challenges::core::HttpResponse;
use crate::modules::soft_lock::{LockError, SoftLock};

pub use cookies::{
    extract_challenge_cookies, extract_set_cookies, is_challenge_cookie, merge_cookies,
    render_cookie_header,
};

/// Header naming the origin a cached header set belongs to.
pub const DOMAIN_MARKER_HEADER: &str = "X-Domain";

/// Header name → value for one origin.
pub type HeaderSet = BTreeMap<String, String>;

/// Whole cache document, origin → header set.
pub type CacheDocument = BTreeMap<String, HeaderSet>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache lock failed: {0}")]
    Lock(#[from] LockError),
    #[error("I/O error on cache {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cache serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// File-backed domain → headers cache.
#[derive(Debug, Clone)]
pub struct DomainCache {
    path: PathBuf,
    lock: SoftLock,
}

impl DomainCache {
    /// Open the cache at `path`. A lock file left behind by a crashed run is
    /// removed the first time the path is opened in this process.
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let lock = SoftLock::for_file(&path, lock_timeout);
        lock.sweep_stale_once();
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock(&self) -> &SoftLock {
        &self.lock
    }

    /// Load the document. Missing or corrupt files read as an empty cache.
    pub fn get(&self) -> CacheDocument {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return CacheDocument::new(),
            Err(err) => {
                log::warn!("could not read cache {}: {err}", self.path.display());
                return CacheDocument::new();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|err| {
            log::warn!("ignoring corrupt cache {}: {err}", self.path.display());
            CacheDocument::new()
        })
    }

    /// Cached headers for `domain`, always carrying the domain marker. The
    /// file is read on the blocking pool.
    pub async fn headers_for(&self, domain: &str) -> HeaderSet {
        let cache = self.clone();
        let key = domain.to_string();
        let mut headers = match tokio::task::spawn_blocking(move || cache.get().remove(&key)).await
        {
            Ok(cached) => cached.unwrap_or_default(),
            Err(err) => {
                log::warn!("reading cache {} failed: {err}", self.path.display());
                HeaderSet::new()
            }
        };
        headers.insert(DOMAIN_MARKER_HEADER.to_string(), domain.to_string());
        headers
    }

    /// Overwrite the document. Callers hold the lock across read-merge-write.
    pub fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        document.serialize(&mut serializer)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(&self.path, buffer).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Persist the challenge cookies seen on `response` under `domain`.
    ///
    /// Returns `Ok(false)` when there was nothing worth storing. On failure the
    /// lock file is cleared so later callers are not left waiting on it.
    pub async fn save_cookies_from_challenge(
        &self,
        domain: &str,
        response: &HttpResponse,
        session_cookies: Vec<(String, String)>,
    ) -> Result<bool, CacheError> {
        let result = self
            .store_cookies(domain, response, session_cookies)
            .await;
        if result.is_err() {
            self.lock.clear();
        }
        result
    }

    async fn store_cookies(
        &self,
        domain: &str,
        response: &HttpResponse,
        session_cookies: Vec<(String, String)>,
    ) -> Result<bool, CacheError> {
        let from_response = extract_set_cookies(
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );
        let request_cookie = response
            .request_headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        let from_request = extract_challenge_cookies(&request_cookie);

        let merged = merge_cookies(from_response, from_request, session_cookies);
        if merged.is_empty() {
            return Ok(false);
        }

        let mut headers = HeaderSet::new();
        headers.insert("Cookie".to_string(), render_cookie_header(&merged));
        headers.insert(DOMAIN_MARKER_HEADER.to_string(), domain.to_string());
        if let Some(agent) = response
            .request_headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
        {
            headers.insert("User-Agent".to_string(), agent.to_string());
        }

        let _guard = self.lock.acquire().await?;
        let cache = self.clone();
        let key = domain.to_string();
        tokio::task::spawn_blocking(move || {
            let mut document = cache.get();
            document.insert(key, headers);
            cache.save(&document)
        })
        .await??;

        log::debug!(
            "stored {} challenge cookie(s) for {domain} in {}",
            merged.len(),
            self.path.display()
        );
        Ok(true)
    }
}
