//! Typed classification of request failures.

use std::fmt;

use super::client::SolverError;

/// Why a call did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The server answered with a status >= 400.
    HttpStatus { status: u16, cloudflare: bool },
    Timeout,
    /// A fresh challenge was served; worth re-running the whole call.
    ChallengeRetryable,
    ChallengeFatal,
    MaxRetriesExceeded,
    Unclassified(String),
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        FailureKind::HttpStatus {
            status,
            cloudflare: matches!(status, 429 | 503),
        }
    }

    /// Classify a solver error; untyped transport errors fall back to the
    /// markers found in their text.
    pub fn classify(error: &SolverError) -> Self {
        match error {
            SolverError::NewChallenge => FailureKind::ChallengeRetryable,
            SolverError::ConnectTimeout(_) | SolverError::ReadTimeout(_) => FailureKind::Timeout,
            SolverError::Cloudflare(_) | SolverError::LoopProtection(_) => {
                FailureKind::ChallengeFatal
            }
            SolverError::MaxRetries(_) => FailureKind::MaxRetriesExceeded,
            SolverError::Transport(trace) => Self::classify_text(trace),
        }
    }

    fn classify_text(trace: &str) -> Self {
        if trace.contains("new Cloudflare challenge") {
            FailureKind::ChallengeRetryable
        } else if trace.contains("ConnectTimeout")
            || trace.contains("ReadTimeout")
            || trace.contains("timed out")
        {
            FailureKind::Timeout
        } else if trace.contains("Cloudflare") || trace.contains("!!Loop Protection!!") {
            FailureKind::ChallengeFatal
        } else if trace.contains("Max retries exceeded") {
            FailureKind::MaxRetriesExceeded
        } else {
            FailureKind::Unclassified(trace.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::ChallengeRetryable)
    }

    /// Human readable message stored as the executor's last error.
    pub fn message(&self) -> String {
        match self {
            FailureKind::HttpStatus { status, cloudflare } => {
                let mut message = format!("response status code {status}");
                if *cloudflare {
                    message.push_str(" (probably Cloudflare)");
                }
                message
            }
            FailureKind::Timeout => "request timed out".to_string(),
            // A retryable challenge only surfaces once the budget is spent.
            FailureKind::ChallengeRetryable | FailureKind::ChallengeFatal => {
                "failed Cloudflare protection".to_string()
            }
            FailureKind::MaxRetriesExceeded => "Max retries exceeded".to_string(),
            FailureKind::Unclassified(trace) => format!("failed - {trace}"),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
