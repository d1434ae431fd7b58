//! WARC archive output
//!
//! This module handles:
//! - Serializing request, response and revisit records
//! - Segmented container files with size-based rollover
//! - Payload deduplication against the dedup index
//! - The per-session fetch log

mod log;
mod record;
mod segment;
mod writer;

pub use log::{format_line, SessionLog};
pub use record::{warc_date, RecordType, WarcRecord, IDENTICAL_PAYLOAD_PROFILE};
pub use segment::{next_segment_index, parse_segment_index, segment_name, SegmentWriter};
pub use writer::{ArchiveSettings, ArchiveWriter, WriteReceipt};
