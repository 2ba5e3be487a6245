//! Core utilities shared by the detector, the solving client, and the executor.

pub mod analysis;
pub mod client;
pub mod failure;
pub mod reqwest_client;
pub mod types;

pub use analysis::{
    is_cloudflare_response, is_iuam_challenge, is_new_challenge, origin_from_str,
    origin_from_url, strip_scheme,
};
pub use client::{ChallengeSolvingClient, SolverError};
pub use failure::FailureKind;
pub use reqwest_client::ReqwestSolvingClient;
pub use types::{HttpResponse, RequestDescriptor, SYNTHETIC_FAILURE_STATUS};
