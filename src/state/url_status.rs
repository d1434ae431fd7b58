/// Status of a URL recorded in the dedup index
use std::fmt;

/// Represents where a recorded URL stands in the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlStatus {
    // ===== Active States =====
    /// Admitted to the frontier but not finished; resumed on restart
    Todo,

    // ===== Terminal States =====
    /// Fetched and archived
    Done,

    /// 3xx response archived, target queued separately
    Redirect,

    /// Failed after retries or permanently
    Error,

    /// Matched an ignore set when dequeued; never requested
    Skipped,
}

impl UrlStatus {
    /// Returns true if the URL no longer needs work
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Todo)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Done => "done",
            Self::Redirect => "redirect",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "done" => Some(Self::Done),
            "redirect" => Some(Self::Redirect),
            "error" => Some(Self::Error),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn all_statuses() -> [Self; 5] {
        [
            Self::Todo,
            Self::Done,
            Self::Redirect,
            Self::Error,
            Self::Skipped,
        ]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
