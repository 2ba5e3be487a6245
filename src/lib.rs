//! # cf-request
//!
//! A polite, Cloudflare-aware HTTP request layer for scrapers.
//!
//! Calls are optionally serialized and spaced apart, challenge cookies earned
//! on one run are persisted to a shared JSON file and replayed on the next,
//! and base URLs are resolved through HEAD probes before anything is fetched.
//! Nothing here raises on network trouble: failures are classified, logged,
//! and turned into a `None` or a synthetic 501 response.
//!
//! ## Features
//!
//! - Sequential mode with a fixed gap between calls
//! - Shared on-disk cookie cache guarded by a soft file lock
//! - HEAD based domain resolution with redirect chasing and memoization
//! - Bounded retry when a fresh challenge is served
//! - Event hooks on top of `log` based reporting
//!
//! ## Example
//!
//! ```no_run
//! use cf_request::Request;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = Request::builder().sequential(true).build()?;
//!     match request.get("https://example.com/search?q=rust").await {
//!         Some(response) => println!("{}: {}", response.status(), response.text()),
//!         None => println!("unreachable: {}", request.last_error()),
//!     }
//!     Ok(())
//! }
//! ```

mod request;

pub mod challenges;
pub mod config;
pub mod modules;

pub use crate::request::{
    HeadCache,
    Request,
    RequestBuilder,
    RequestError,
    RequestResult,
    UrlParts,
};

pub use crate::challenges::core::{
    ChallengeSolvingClient,
    FailureKind,
    HttpResponse,
    ReqwestSolvingClient,
    RequestDescriptor,
    SYNTHETIC_FAILURE_STATUS,
    SolverError,
    is_iuam_challenge,
    is_new_challenge,
};

pub use crate::challenges::user_agents::{browser_headers, random_user_agent};

pub use crate::config::{ConfigError, RequestConfig};

pub use crate::modules::{
    CacheDocument,
    CacheError,
    DomainCache,
    EventDispatcher,
    EventHandler,
    HeadCheck,
    HeadCheckMemo,
    HeadProbe,
    HeadResolver,
    LockError,
    LoggingHandler,
    RequestLayerEvent,
    SoftLock,
    TtlCache,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
