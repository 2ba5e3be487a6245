// Challenge detection, failure classification, and the HTTP client contract.

pub mod core;
pub mod user_agents;
