//! Human-readable session log, one line per handled task

use crate::crawler::{FetchResult, FetchStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Appends fetch outcomes to the session log file
pub struct SessionLog {
    out: BufWriter<File>,
}

impl SessionLog {
    /// Opens the log for appending, creating it if needed
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, result: &FetchResult, at: DateTime<Utc>) -> io::Result<()> {
        writeln!(self.out, "{}", format_line(result, at))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// `<timestamp> <status> <code> <bytes> <url>[ <error kind>]`
pub fn format_line(result: &FetchResult, at: DateTime<Utc>) -> String {
    let timestamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let code = result
        .status_code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());

    let (status, kind) = match result.status {
        FetchStatus::Success => ("OK", None),
        FetchStatus::Redirect => ("REDIRECT", None),
        FetchStatus::Error(kind) => ("ERROR", Some(kind)),
        FetchStatus::Skipped => ("SKIPPED", None),
    };

    let mut line = format!(
        "{} {} {} {} {}",
        timestamp,
        status,
        code,
        result.body_len(),
        result.task.url
    );
    if let Some(kind) = kind {
        line.push(' ');
        line.push_str(&kind.to_string());
    }
    line
}
