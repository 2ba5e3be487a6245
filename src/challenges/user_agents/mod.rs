//! Built-in browser identities.
//!
//! Requests going out without a caller supplied `User-Agent` borrow one of
//! these so HEAD probes and page fetches look like an ordinary browser.

use http::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use http::{HeaderMap, HeaderValue};
use rand::seq::SliceRandom;
use rand::thread_rng;

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Pick a random user-agent string.
pub fn random_user_agent(mobile: bool) -> &'static str {
    let pool = if mobile {
        MOBILE_USER_AGENTS
    } else {
        DESKTOP_USER_AGENTS
    };

    pool.choose(&mut thread_rng())
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Browser-like default headers for the given user-agent.
pub fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_from_requested_pool() {
        assert!(DESKTOP_USER_AGENTS.contains(&random_user_agent(false)));
        assert!(MOBILE_USER_AGENTS.contains(&random_user_agent(true)));
    }

    #[test]
    fn headers_carry_user_agent() {
        let headers = browser_headers("TestAgent/1.0");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "TestAgent/1.0");
        assert!(headers.contains_key(ACCEPT));
    }
}
