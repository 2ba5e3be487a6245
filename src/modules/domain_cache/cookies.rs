//! Challenge cookie extraction and merging.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Names Cloudflare (and the PHP sessions it fronts) use for clearance state.
static CHALLENGE_COOKIE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:PHPSESSID|__cf.*|cf.*)$").unwrap());

pub fn is_challenge_cookie(name: &str) -> bool {
    CHALLENGE_COOKIE_RE.is_match(name)
}

fn split_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.trim().split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
}

/// Challenge cookies from a `Cookie` request header (`a=1; b=2`).
pub fn extract_challenge_cookies(cookie_header: &str) -> Vec<(String, String)> {
    cookie_header
        .split(';')
        .filter_map(split_pair)
        .filter(|(name, _)| is_challenge_cookie(name))
        .collect()
}

/// Challenge cookies from `Set-Cookie` header values. Only the leading
/// `name=value` of each value is a cookie; the rest are attributes.
pub fn extract_set_cookies<'a, I>(values: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter_map(|value| value.split(';').next().and_then(split_pair))
        .filter(|(name, _)| is_challenge_cookie(name))
        .collect()
}

/// Merge cookie sources by precedence: session cookies over response cookies
/// over cookies the request already carried.
pub fn merge_cookies(
    from_response: Vec<(String, String)>,
    from_request: Vec<(String, String)>,
    from_session: Vec<(String, String)>,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = from_response.into_iter().collect();
    for (name, value) in from_request {
        merged.entry(name).or_insert(value);
    }
    merged.extend(from_session);
    merged
}

pub fn render_cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}
