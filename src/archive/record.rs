//! WARC/1.0 record serialization

use crate::crawler::{FetchedResponse, RequestInfo};
use crate::storage::PayloadRecord;
use crate::url::Fingerprint;
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};
use url::Url;

const WARC_VERSION: &str = "WARC/1.0";

/// Profile URI of revisit records that point at an identical payload
pub const IDENTICAL_PAYLOAD_PROFILE: &str =
    "http://netpreserve.org/warc/1.0/revisit/identical-payload-digest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Warcinfo,
    Request,
    Response,
    Revisit,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warcinfo => "warcinfo",
            Self::Request => "request",
            Self::Response => "response",
            Self::Revisit => "revisit",
        }
    }
}

/// Formats a timestamp the way `WARC-Date` expects it
pub fn warc_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn new_record_id() -> String {
    format!("<urn:uuid:{}>", uuid::Uuid::new_v4())
}

/// One WARC record: named header fields and a content block
#[derive(Debug, Clone)]
pub struct WarcRecord {
    pub record_type: RecordType,
    pub record_id: String,
    pub date: String,
    pub headers: Vec<(String, String)>,
    pub block: Vec<u8>,
}

impl WarcRecord {
    pub fn new(record_type: RecordType, date: &str, block: Vec<u8>) -> Self {
        Self {
            record_type,
            record_id: new_record_id(),
            date: date.to_string(),
            headers: Vec::new(),
            block,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Leading `warcinfo` record of a segment
    pub fn warcinfo(filename: &str, date: &str, fields: &[(String, String)]) -> Self {
        let mut block = Vec::new();
        for (name, value) in fields {
            block.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        Self::new(RecordType::Warcinfo, date, block)
            .with_header("WARC-Filename", filename)
            .with_header("Content-Type", "application/warc-fields")
    }

    /// `request` record with the request line and headers as sent
    pub fn request(request: &RequestInfo, date: &str) -> Self {
        let mut target = request.url.path().to_string();
        if let Some(query) = request.url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut block = format!("{} {} HTTP/1.1\r\n", request.method, target).into_bytes();
        append_headers(&mut block, &request.headers);

        let digest = Fingerprint::of_bytes(&block);
        Self::new(RecordType::Request, date, block)
            .with_header("WARC-Target-URI", request.url.as_str())
            .with_header("Content-Type", "application/http;msgtype=request")
            .with_header("WARC-Block-Digest", digest.warc_digest())
    }

    /// `response` record with the full HTTP response
    pub fn response(url: &Url, response: &FetchedResponse, date: &str) -> Self {
        let mut block = http_head(response);
        block.extend_from_slice(&response.body);

        let block_digest = Fingerprint::of_bytes(&block);
        let payload_digest = Fingerprint::of_bytes(&response.body);
        let mut record = Self::new(RecordType::Response, date, block)
            .with_header("WARC-Target-URI", url.as_str())
            .with_header("Content-Type", "application/http;msgtype=response")
            .with_header("WARC-Payload-Digest", payload_digest.warc_digest())
            .with_header("WARC-Block-Digest", block_digest.warc_digest());
        if let Some(mime) = response.media_type() {
            record = record.with_header("WARC-Identified-Payload-Type", mime);
        }
        record
    }

    /// `revisit` record for a response whose body is already archived
    ///
    /// Only the HTTP head is stored; the payload is referenced by digest.
    pub fn revisit(url: &Url, response: &FetchedResponse, original: &PayloadRecord, date: &str) -> Self {
        let block = http_head(response);
        let block_digest = Fingerprint::of_bytes(&block);

        Self::new(RecordType::Revisit, date, block)
            .with_header("WARC-Target-URI", url.as_str())
            .with_header("WARC-Profile", IDENTICAL_PAYLOAD_PROFILE)
            .with_header("WARC-Refers-To", original.record_id.as_str())
            .with_header("WARC-Refers-To-Target-URI", original.target_uri.as_str())
            .with_header("WARC-Refers-To-Date", original.date.as_str())
            .with_header("Content-Type", "application/http;msgtype=response")
            .with_header("WARC-Payload-Digest", original.digest.warc_digest())
            .with_header("WARC-Block-Digest", block_digest.warc_digest())
    }

    /// Links this record to another record of the same exchange
    pub fn concurrent_to(self, other: &WarcRecord) -> Self {
        let id = other.record_id.clone();
        self.with_header("WARC-Concurrent-To", id)
    }

    /// Serializes the record, uncompressed
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.block.len() + 512);
        out.extend_from_slice(WARC_VERSION.as_bytes());
        out.extend_from_slice(b"\r\n");
        push_field(&mut out, "WARC-Type", self.record_type.as_str());
        push_field(&mut out, "WARC-Record-ID", &self.record_id);
        push_field(&mut out, "WARC-Date", &self.date);
        for (name, value) in &self.headers {
            push_field(&mut out, name, value);
        }
        push_field(&mut out, "Content-Length", &self.block.len().to_string());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.block);
        out.extend_from_slice(b"\r\n\r\n");
        out
    }

    /// Serializes the record, as its own gzip member when `gzip` is set
    pub fn encode(&self, gzip: bool) -> io::Result<Vec<u8>> {
        let raw = self.to_bytes();
        if !gzip {
            return Ok(raw);
        }

        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
        encoder.write_all(&raw)?;
        encoder.finish()
    }
}

fn push_field(out: &mut Vec<u8>, name: &str, value: &str) {
    // Header values never span lines
    let value = value.replace(['\r', '\n'], " ");
    out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
}

fn append_headers(block: &mut Vec<u8>, headers: &[(String, String)]) {
    for (name, value) in headers {
        block.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    block.extend_from_slice(b"\r\n");
}

/// Status line and headers of a response, including the blank line
fn http_head(response: &FetchedResponse) -> Vec<u8> {
    let mut head = format!("{} {} {}", response.version, response.status, response.reason)
        .trim_end()
        .to_string()
        .into_bytes();
    head.extend_from_slice(b"\r\n");
    append_headers(&mut head, &response.headers);
    head
}
