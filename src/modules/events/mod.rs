//! Event system for request activity.
//!
//! Every network attempt and every classified failure is broadcast to the
//! registered handlers. The default [`LoggingHandler`] forwards them to the
//! `log` facade; callers can add their own handlers to collect them.

use chrono::{DateTime, Utc};
use http::Method;
use std::sync::Arc;
use url::Url;

use crate::challenges::core::FailureKind;

/// Severity attached to each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Notice,
}

/// A request is about to go out.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub method: Method,
    pub url: Url,
    pub timestamp: DateTime<Utc>,
}

/// A call ended without a usable response.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub url: Url,
    pub kind: FailureKind,
    pub timestamp: DateTime<Utc>,
}

/// A fresh challenge was served and the call is being re-run.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub url: Url,
    pub retries_left: u32,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of persisting challenge cookies for a domain.
#[derive(Debug, Clone)]
pub struct CookieEvent {
    pub domain: String,
    pub stored: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RequestLayerEvent {
    Request(RequestEvent),
    Failure(FailureEvent),
    Retry(RetryEvent),
    Cookies(CookieEvent),
}

impl RequestLayerEvent {
    pub fn level(&self) -> LogLevel {
        match self {
            RequestLayerEvent::Request(_) => LogLevel::Info,
            RequestLayerEvent::Cookies(cookies) if cookies.error.is_none() => LogLevel::Info,
            _ => LogLevel::Notice,
        }
    }
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &RequestLayerEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default, Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: RequestLayerEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate; notices go out as warnings.
#[derive(Debug)]
pub struct LoggingHandler;

impl LoggingHandler {
    fn emit(level: LogLevel, message: std::fmt::Arguments<'_>) {
        match level {
            LogLevel::Info => log::info!("{message}"),
            LogLevel::Notice => log::warn!("{message}"),
        }
    }
}

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &RequestLayerEvent) {
        let level = event.level();
        match event {
            RequestLayerEvent::Request(request) => {
                Self::emit(level, format_args!("{}: {}", request.method, request.url));
            }
            RequestLayerEvent::Failure(failure) => {
                Self::emit(level, format_args!("{} {}", failure.url, failure.kind));
            }
            RequestLayerEvent::Retry(retry) => {
                Self::emit(
                    level,
                    format_args!(
                        "cf_new_challenge_retry: {} ({} left)",
                        retry.url, retry.retries_left
                    ),
                );
            }
            RequestLayerEvent::Cookies(cookies) => match cookies.error {
                Some(ref error) => Self::emit(
                    level,
                    format_args!("saving cookies for {} failed: {error}", cookies.domain),
                ),
                None => log::debug!(
                    "cookies for {} stored={}",
                    cookies.domain,
                    cookies.stored
                ),
            },
        }
    }
}
