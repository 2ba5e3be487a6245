use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use cf_request::{
    Request,
    RequestConfig,
    UrlParts,
    VERSION,
    modules::{DomainCache, HeadCheck},
};
use tokio::runtime::Runtime;
use url::Url;

fn prompt(label: &str) -> io::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_bool(input: &str, default: bool) -> bool {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => true,
        "n" | "no" | "false" => false,
        _ => default,
    }
}

fn parse_u32(input: &str, default: u32) -> u32 {
    input.trim().parse().ok().unwrap_or(default)
}

#[test]
#[ignore = "Requires network access and manual input"]
fn interactive_full_stack() -> Result<(), Box<dyn Error>> {
    println!("cf-request {} interactive smoke test", VERSION);
    println!("Provide inputs when prompted. Press Enter to accept defaults.\n");

    let url_input = prompt("Target URL [https://example.com]:")?;
    let target_url = if url_input.is_empty() {
        "https://example.com".to_string()
    } else {
        url_input
    };
    let mirrors_answer = prompt("Mirror base URLs (comma separated, blank to skip):")?;
    let sequential_answer = prompt("Sequential mode? (Y/n):")?;
    let retries_answer = prompt("Fresh challenge retries [3]:")?;
    let config_answer = prompt("Config JSON file (blank for defaults):")?;

    let mut config = if config_answer.is_empty() {
        RequestConfig::default()
    } else {
        RequestConfig::from_json_file(&config_answer)?
    };
    config.sequential = parse_bool(&sequential_answer, true);
    config.challenge_retries = parse_u32(&retries_answer, config.challenge_retries);
    config.wait = Duration::from_millis(500);

    let cache_path = config.cache_path.clone();
    let request = Request::with_config(config)?;
    let runtime = Runtime::new()?;

    println!("\nFetching {}...", target_url);
    match runtime.block_on(request.get(&target_url)) {
        Some(response) => {
            println!("Status: {}", response.status());
            println!("Final URL: {}", response.url());
            println!("Headers received: {}", response.headers().len());
            let snippet: String = response.text().chars().take(400).collect();
            println!("Body preview (first 400 chars):\n{}\n", snippet);
        }
        None => println!("Origin unreachable: {:?}", request.last_error()),
    }
    if !request.last_error().is_empty() {
        println!("Last error: {}", request.last_error());
    }

    let mirrors: Vec<UrlParts> = mirrors_answer
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|base| UrlParts::new(base, "/search?q={query}", ""))
        .collect();
    if !mirrors.is_empty() {
        match runtime.block_on(request.find_url(&mirrors)) {
            Some(found) => println!("First live mirror: {}", found.base),
            None => println!("No live mirror among {} candidate(s)", mirrors.len()),
        }
    }

    report_state(&request, &target_url, &cache_path)?;

    println!("Interactive test complete. Re-run with different inputs as needed.");
    Ok(())
}

fn report_state(
    request: &Request,
    target_url: &str,
    cache_path: &std::path::Path,
) -> Result<(), Box<dyn Error>> {
    println!("\n--- Request layer state ---");

    let target = Url::parse(target_url)?;
    let origin = cf_request::challenges::core::origin_from_url(&target);
    match request.head_memo().get(&origin) {
        Some(HeadCheck::Reachable(live)) => println!("HEAD memo {} -> reachable: {}", origin, live),
        Some(HeadCheck::RedirectsTo(next)) => println!("HEAD memo {} -> redirects to {}", origin, next),
        None => println!("HEAD memo has no entry for {}", origin),
    }
    println!("HEAD memo size: {}", request.head_memo().len());

    let cache = DomainCache::new(cache_path, Duration::from_secs(1));
    let document = cache.get();
    println!("Cookie cache {} -> {} domain(s)", cache_path.display(), document.len());
    for (domain, headers) in &document {
        let names: Vec<&str> = headers.keys().map(String::as_str).collect();
        println!("  {} -> {:?}", domain, names);
    }

    println!("--- State report complete ---\n");
    Ok(())
}
