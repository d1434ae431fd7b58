//! URL handling module for Sitegrab
//!
//! This module provides URL normalization, fingerprints, host identity,
//! ignore sets and the scope rules deciding which discovered links are crawled.

mod domain;
mod fingerprint;
mod ignore;
mod normalize;
mod scope;

// Re-export main functions
pub use domain::{directory_of, extract_host, host_key};
pub use fingerprint::Fingerprint;
pub use ignore::{IgnoreSets, CUSTOM_SET, GLOBAL_PATTERNS, GLOBAL_SET};
pub use normalize::{normalize_parsed, normalize_url, normalize_with};
pub use scope::{DropReason, LinkKind, Scope, ScopeRules};
