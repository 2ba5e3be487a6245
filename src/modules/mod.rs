//! Cross-cutting services module
//!
//! Persistence, locking, HEAD resolution, caching, and event reporting used by
//! the request executor.

pub mod domain_cache;
pub mod events;
pub mod head_check;
pub mod soft_lock;
pub mod ttl_cache;

// Re-export commonly used types
pub use domain_cache::{CacheDocument, CacheError, DomainCache, HeaderSet, DOMAIN_MARKER_HEADER};
pub use events::{
    CookieEvent, EventDispatcher, EventHandler, FailureEvent, LogLevel, LoggingHandler,
    RequestEvent, RequestLayerEvent, RetryEvent,
};
pub use head_check::{HeadCheck, HeadCheckMemo, HeadProbe, HeadResolver};
pub use soft_lock::{LockError, SoftLock, SoftLockGuard};
pub use ttl_cache::{TtlCache, DEFAULT_TTL};
