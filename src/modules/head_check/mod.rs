//! HEAD-based domain resolution.
//!
//! Mirrors move around and go dark, so before fetching a page the executor
//! asks whether the origin is alive and where it lives now. Answers are kept in
//! a [`HeadCheckMemo`] for the life of the process: either a terminal
//! reachable/dead flag or a pointer to the origin it redirects to.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use http::header::LOCATION;
use url::Url;

use crate::challenges::core::{
    HttpResponse, is_iuam_challenge, origin_from_str, origin_from_url, strip_scheme,
};

/// Memoized outcome for one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadCheck {
    Reachable(bool),
    RedirectsTo(String),
}

/// Process-local origin → [`HeadCheck`] table. Cloning shares the table.
#[derive(Clone, Debug, Default)]
pub struct HeadCheckMemo {
    inner: Arc<RwLock<HashMap<String, HeadCheck>>>,
}

impl HeadCheckMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, origin: &str) -> Option<HeadCheck> {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(origin).cloned())
    }

    pub fn set(&self, origin: impl Into<String>, check: HeadCheck) {
        if let Ok(mut guard) = self.inner.write() {
            guard.insert(origin.into(), check);
        }
    }

    /// Follow redirects from `origin` to the last known hop. Returns that hop
    /// and its terminal flag, or `None` when the chain ends unresolved or loops.
    pub fn resolve_chain(&self, origin: &str) -> (String, Option<bool>) {
        let Ok(map) = self.inner.read() else {
            return (origin.to_string(), None);
        };

        let mut current = origin.to_string();
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(current.clone()) {
                return (current, None);
            }
            match map.get(&current) {
                Some(HeadCheck::Reachable(alive)) => return (current, Some(*alive)),
                Some(HeadCheck::RedirectsTo(next)) => current = next.clone(),
                None => return (current, None),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            guard.clear();
        }
    }
}

/// Issues the actual HEAD request for an origin.
///
/// `None` means no response came back at all (refused, timed out, ...).
#[async_trait]
pub trait HeadProbe: Send + Sync {
    async fn probe(&self, origin: &Url) -> Option<HttpResponse>;
}

/// Resolves base URLs to their live origin and status.
#[derive(Debug)]
pub struct HeadResolver {
    memo: HeadCheckMemo,
    skip_head: AtomicBool,
    max_redirect_hops: usize,
}

impl HeadResolver {
    pub fn new(memo: HeadCheckMemo, max_redirect_hops: usize) -> Self {
        Self {
            memo,
            skip_head: AtomicBool::new(false),
            max_redirect_hops,
        }
    }

    pub fn memo(&self) -> &HeadCheckMemo {
        &self.memo
    }

    /// When set, every URL is reported reachable without probing.
    pub fn set_skip_head(&self, skip: bool) {
        self.skip_head.store(skip, Ordering::Relaxed);
    }

    pub fn skip_head(&self) -> bool {
        self.skip_head.load(Ordering::Relaxed)
    }

    pub async fn resolve(&self, url: &str, probe: &dyn HeadProbe) -> (String, u16) {
        if self.skip_head() {
            return (url.to_string(), 200);
        }

        let Some(mut origin) = origin_from_str(url) else {
            return (url.to_string(), 500);
        };

        let mut hops = 0;
        loop {
            let (last_hop, cached) = self.memo.resolve_chain(&origin);
            match cached {
                Some(true) => return (last_hop, 200),
                Some(false) => return (last_hop, 500),
                None => origin = last_hop,
            }

            let Ok(origin_url) = Url::parse(&origin) else {
                self.memo.set(origin.clone(), HeadCheck::Reachable(false));
                return (origin, 500);
            };

            // Without a clean HEAD answer the host is still presumed up; the
            // page fetch reports what is actually wrong.
            let response = match probe.probe(&origin_url).await {
                Some(response)
                    if !is_iuam_challenge(&response, true) && response.status() < 400 =>
                {
                    response
                }
                _ => {
                    self.memo.set(origin.clone(), HeadCheck::Reachable(true));
                    return (origin, 200);
                }
            };

            let final_origin = if response.url().has_host() {
                origin_from_url(response.url())
            } else {
                origin.clone()
            };

            if hops < self.max_redirect_hops
                && let Some(target) = redirect_target(&final_origin, &response)
            {
                log::debug!("HEAD {final_origin} redirects to {target}");
                self.memo
                    .set(final_origin, HeadCheck::RedirectsTo(target.clone()));
                origin = target;
                hops += 1;
                continue;
            }

            let status = response.status();
            self.memo
                .set(final_origin.clone(), HeadCheck::Reachable(status == 200));
            return (final_origin, status);
        }
    }
}

/// Origin an explicit redirect points at, when it is worth chasing.
fn redirect_target(source_origin: &str, response: &HttpResponse) -> Option<String> {
    if !matches!(response.status(), 301 | 302 | 303 | 307 | 308) {
        return None;
    }

    let location = response.headers().get(LOCATION)?.to_str().ok()?.trim();
    let bare = location.trim_end_matches('/');
    if bare.ends_with("127.0.0.1") || bare.ends_with("localhost") {
        return None;
    }

    let target = response.url().join(location).ok()?;
    if target.as_str() == response.url().as_str()
        || matches!(target.host_str(), Some("localhost" | "127.0.0.1") | None)
    {
        return None;
    }

    let target_origin = origin_from_url(&target);
    if target_origin == source_origin {
        return None;
    }

    let host_changed = strip_scheme(source_origin) != strip_scheme(&target_origin);
    (host_changed || target.scheme() == "https").then_some(target_origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubProbe {
        routes: HashMap<String, (u16, Vec<(&'static str, &'static str)>)>,
        calls: Mutex<Vec<String>>,
    }

    impl StubProbe {
        fn route(mut self, origin: &str, status: u16, headers: &[(&'static str, &'static str)]) -> Self {
            self.routes
                .insert(origin.to_string(), (status, headers.to_vec()));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HeadProbe for StubProbe {
        async fn probe(&self, origin: &Url) -> Option<HttpResponse> {
            let key = origin_from_url(origin);
            self.calls.lock().unwrap().push(key.clone());
            let (status, headers) = self.routes.get(&key)?;

            let mut map = HeaderMap::new();
            for (name, value) in headers {
                map.insert(*name, HeaderValue::from_static(value));
            }
            Some(HttpResponse::new(*status, map, Bytes::new(), origin.clone()))
        }
    }

    fn resolver() -> HeadResolver {
        HeadResolver::new(HeadCheckMemo::new(), 5)
    }

    #[tokio::test]
    async fn probes_origin_once_and_memoizes() {
        let probe = StubProbe::default().route("https://site.example", 200, &[]);
        let resolver = resolver();

        let first = resolver.resolve("https://site.example/some/path?q=1", &probe).await;
        let second = resolver.resolve("https://site.example/other", &probe).await;

        assert_eq!(first, ("https://site.example".to_string(), 200));
        assert_eq!(second, first);
        assert_eq!(probe.calls(), vec!["https://site.example".to_string()]);
    }

    #[tokio::test]
    async fn dead_origin_is_memoized_as_dead() {
        let probe = StubProbe::default().route("https://dead.example", 204, &[]);
        let resolver = resolver();

        assert_eq!(resolver.resolve("https://dead.example", &probe).await.1, 204);
        assert_eq!(
            resolver.resolve("https://dead.example", &probe).await,
            ("https://dead.example".to_string(), 500)
        );
        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn transitive_chain_resolves_without_probing() {
        let probe = StubProbe::default();
        let resolver = resolver();
        let memo = resolver.memo();
        memo.set("https://a.example", HeadCheck::RedirectsTo("https://b.example".into()));
        memo.set("https://b.example", HeadCheck::RedirectsTo("https://c.example".into()));
        memo.set("https://c.example", HeadCheck::Reachable(true));

        assert_eq!(
            resolver.resolve("https://a.example", &probe).await,
            ("https://c.example".to_string(), 200)
        );
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn follows_redirect_to_new_host() {
        let probe = StubProbe::default()
            .route("https://old.example", 301, &[("location", "https://new.example/")])
            .route("https://new.example", 200, &[]);
        let resolver = resolver();

        let resolved = resolver.resolve("https://old.example", &probe).await;
        assert_eq!(resolved, ("https://new.example".to_string(), 200));
        assert_eq!(
            resolver.memo().get("https://old.example"),
            Some(HeadCheck::RedirectsTo("https://new.example".into()))
        );

        assert_eq!(
            resolver.resolve("https://old.example", &probe).await,
            ("https://new.example".to_string(), 200)
        );
        assert_eq!(probe.calls().len(), 2);
    }

    #[tokio::test]
    async fn follows_https_upgrade_but_not_downgrade() {
        let probe = StubProbe::default()
            .route("http://site.example", 301, &[("location", "https://site.example/")])
            .route("https://site.example", 200, &[]);
        let resolver = resolver();
        assert_eq!(
            resolver.resolve("http://site.example", &probe).await,
            ("https://site.example".to_string(), 200)
        );

        let probe = StubProbe::default()
            .route("https://legacy.example", 302, &[("location", "http://legacy.example/")]);
        let resolver = HeadResolver::new(HeadCheckMemo::new(), 5);
        assert_eq!(resolver.resolve("https://legacy.example", &probe).await.1, 302);
        assert_eq!(
            resolver.memo().get("https://legacy.example"),
            Some(HeadCheck::Reachable(false))
        );
    }

    #[tokio::test]
    async fn loopback_redirects_are_not_chased() {
        let probe = StubProbe::default()
            .route("https://blocked.example", 302, &[("location", "http://127.0.0.1")]);
        let resolver = resolver();

        assert_eq!(resolver.resolve("https://blocked.example", &probe).await.1, 302);
        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn challenge_and_error_heads_count_as_reachable() {
        let probe = StubProbe::default()
            .route("https://guarded.example", 503, &[("server", "cloudflare")])
            .route("https://broken.example", 404, &[]);
        let resolver = resolver();

        assert_eq!(
            resolver.resolve("https://guarded.example/path", &probe).await,
            ("https://guarded.example".to_string(), 200)
        );
        assert_eq!(
            resolver.resolve("https://broken.example", &probe).await,
            ("https://broken.example".to_string(), 200)
        );
    }

    #[tokio::test]
    async fn no_response_counts_as_reachable() {
        let probe = StubProbe::default();
        let resolver = resolver();

        assert_eq!(
            resolver.resolve("https://slow.example/page", &probe).await,
            ("https://slow.example".to_string(), 200)
        );
        assert_eq!(
            resolver.memo().get("https://slow.example"),
            Some(HeadCheck::Reachable(true))
        );
        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn shared_memo_gives_identical_answers() {
        let probe = StubProbe::default().route("https://site.example", 200, &[]);
        let memo = HeadCheckMemo::new();
        let first = HeadResolver::new(memo.clone(), 5);
        let second = HeadResolver::new(memo, 5);

        let fresh = first.resolve("https://site.example/a", &probe).await;
        let memoized = second.resolve("https://site.example/a", &probe).await;
        assert_eq!(fresh, memoized);
        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn redirect_loops_are_bounded() {
        let probe = StubProbe::default()
            .route("https://ping.example", 301, &[("location", "https://pong.example")])
            .route("https://pong.example", 301, &[("location", "https://ping.example")]);
        let resolver = HeadResolver::new(HeadCheckMemo::new(), 3);

        let (_, status) = resolver.resolve("https://ping.example", &probe).await;
        assert_eq!(status, 301);
        assert!(probe.calls().len() <= 4);
    }

    #[tokio::test]
    async fn skip_head_short_circuits() {
        let probe = StubProbe::default();
        let resolver = resolver();
        resolver.set_skip_head(true);

        assert_eq!(
            resolver.resolve("https://anything.example/x", &probe).await,
            ("https://anything.example/x".to_string(), 200)
        );
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn shared_memo_is_visible_across_clones() {
        let memo = HeadCheckMemo::new();
        let other = memo.clone();
        memo.set("https://x.example", HeadCheck::Reachable(true));
        assert_eq!(other.resolve_chain("https://x.example"), ("https://x.example".into(), Some(true)));

        memo.set("https://loop.example", HeadCheck::RedirectsTo("https://loop.example".into()));
        assert_eq!(other.resolve_chain("https://loop.example").1, None);
    }
}
