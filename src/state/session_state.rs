//! Lifecycle states of a crawl session
use std::fmt;

/// Represents the current state of a crawl session
///
/// A session moves strictly forward:
/// `Initializing -> Running -> Draining -> Terminated`. A session that fails
/// before it starts running may go from `Initializing` straight to
/// `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Storage and archive are being opened, seeds are being queued
    Initializing,

    /// Workers fetch, extract and write concurrently
    Running,

    /// No new tasks are admitted; in-flight fetches are finishing
    Draining,

    /// Archive closed and index flushed; final
    Terminated,
}

impl SessionState {
    /// Returns true if the session may move from `self` to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Initializing, Self::Running)
                | (Self::Initializing, Self::Terminated)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Terminated)
        )
    }

    /// Returns true if this is the final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns true if workers may still admit new tasks
    pub fn accepts_tasks(&self) -> bool {
        matches!(self, Self::Initializing | Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
