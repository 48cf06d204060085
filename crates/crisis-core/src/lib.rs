//! Configuration and volunteer matching for the Nexus crisis-response
//! service.
//!
//! # Modules
//!
//! - [`config`] -- Typed YAML configuration with environment overrides
//! - [`matching`] -- Volunteer-to-incident scoring and ranking

pub mod config;
pub mod matching;

pub use config::{ConfigError, CrisisConfig, LogFormat};
pub use matching::{MatchError, match_candidates, match_volunteers, rank_by_score};
