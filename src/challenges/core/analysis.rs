//! Challenge response classification helpers.
//!
//! Stateless checks that decide whether a response is a Cloudflare
//! interstitial, plus origin helpers shared by the cache and the resolver.

use http::header::SERVER;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use url::Url;

use super::types::HttpResponse;

/// Detect whether the response is served by Cloudflare.
pub fn is_cloudflare_response(response: &HttpResponse) -> bool {
    response
        .headers()
        .get(SERVER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("cloudflare"))
        .unwrap_or(false)
}

/// Whether `response` is a classic IUAM ("I'm Under Attack Mode") interstitial.
///
/// With `allow_empty_body` the body is not inspected, which is what HEAD probes
/// need since they never carry one.
pub fn is_iuam_challenge(response: &HttpResponse, allow_empty_body: bool) -> bool {
    if !is_cloudflare_response(response) || !matches!(response.status(), 429 | 503) {
        return false;
    }

    allow_empty_body || IUAM_FORM_RE.is_match(&response.text())
}

/// Whether `response` carries the newer challenge-platform interstitial.
pub fn is_new_challenge(response: &HttpResponse) -> bool {
    is_cloudflare_response(response)
        && matches!(response.status(), 403 | 429 | 503)
        && NEW_CHALLENGE_RE.is_match(&response.text())
}

/// Build origin from URL (`scheme://host[:port]`).
pub fn origin_from_url(url: &Url) -> String {
    let mut origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        origin.push(':');
        origin.push_str(&port.to_string());
    }
    origin
}

/// Origin of a possibly scheme-less URL string; `https` is assumed when the
/// scheme is missing.
pub fn origin_from_str(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(url) if url.has_host() => url,
        _ => Url::parse(&format!("https://{trimmed}")).ok()?,
    };

    parsed.has_host().then(|| origin_from_url(&parsed))
}

/// Origin with the `http://`/`https://` prefix removed, used to compare hosts
/// regardless of scheme.
pub fn strip_scheme(origin: &str) -> &str {
    origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(origin)
}

static IUAM_FORM_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"action="/.*?__cf_chl_jschl_tk__=\S+".*?name="jschl_vc"\svalue=.*?"#)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
        .unwrap()
});

static NEW_CHALLENGE_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"cpo\.src\s*=\s*['"]/cdn-cgi/challenge-platform/|window\._cf_chl_opt"#)
        .case_insensitive(true)
        .build()
        .unwrap()
});
