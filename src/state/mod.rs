//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SessionState`: lifecycle of a crawl session
//! - `UrlStatus`: where each recorded URL stands (todo, done, error, ...)
//! - `HostState`: per-host politeness bookkeeping

mod host_state;
mod session_state;
mod url_status;

// Re-export main types
pub use host_state::HostState;
pub use session_state::SessionState;
pub use url_status::UrlStatus;
