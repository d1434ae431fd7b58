//! Single-writer archive task
//!
//! Fetch workers hand their results to one writer running on a blocking
//! thread. Requests arrive through a bounded channel, so a slow disk applies
//! backpressure to the workers, and every write is acknowledged so a storage
//! failure reaches the worker that produced the result.

use super::log::SessionLog;
use super::record::{warc_date, WarcRecord};
use super::segment::SegmentWriter;
use crate::config::PolicyConfig;
use crate::crawler::{FetchResult, FetchStatus};
use crate::storage::{DedupIndex, PayloadRecord, StorageError, StorageResult};
use crate::url::Fingerprint;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Pending writes allowed before producers wait
const QUEUE_DEPTH: usize = 64;

/// Where and how the archive is written
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub directory: PathBuf,
    pub prefix: String,
    pub gzip: bool,
    pub max_size: u64,
    pub log_path: PathBuf,
    /// Fields of the `warcinfo` record opening each segment
    pub info_fields: Vec<(String, String)>,
}

impl ArchiveSettings {
    pub fn from_config(config: &PolicyConfig) -> Self {
        let output = &config.output;
        Self {
            directory: output.directory.clone(),
            prefix: output.warc_prefix.clone(),
            gzip: output.warc_gzip,
            max_size: output.warc_max_size,
            log_path: output.log_path(),
            info_fields: vec![
                (
                    "software".to_string(),
                    format!("sitegrab/{}", env!("CARGO_PKG_VERSION")),
                ),
                ("format".to_string(), "WARC File Format 1.0".to_string()),
                (
                    "http-header-user-agent".to_string(),
                    config.http.user_agent.clone(),
                ),
            ],
        }
    }
}

/// What a write produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    /// WARC records appended
    pub records: u32,
    /// The response was stored as a revisit of an earlier payload
    pub revisit: bool,
    /// Bytes appended to the container
    pub bytes: u64,
}

enum Command {
    Write {
        result: Arc<FetchResult>,
        ack: oneshot::Sender<StorageResult<WriteReceipt>>,
    },
    Close {
        ack: oneshot::Sender<StorageResult<Vec<PathBuf>>>,
    },
}

/// Handle to the archive writer task
pub struct ArchiveWriter {
    tx: mpsc::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ArchiveWriter {
    /// Prepares the output directory and starts the writer
    ///
    /// Segments are opened lazily, so a session that archives nothing leaves
    /// no empty container behind.
    pub fn spawn(settings: ArchiveSettings, index: Arc<dyn DedupIndex>) -> StorageResult<Self> {
        let segments = SegmentWriter::new(
            &settings.directory,
            &settings.prefix,
            settings.gzip,
            settings.max_size,
            settings.info_fields.clone(),
        )?;
        let log = SessionLog::open(&settings.log_path)?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let state = WriterState {
            segments,
            log,
            index,
        };
        let handle = tokio::task::spawn_blocking(move || state.run(rx));

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Archives one fetch result and logs it
    pub async fn write(&self, result: Arc<FetchResult>) -> StorageResult<WriteReceipt> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Write { result, ack })
            .await
            .map_err(|_| StorageError::WriterClosed)?;
        done.await.map_err(|_| StorageError::WriterClosed)?
    }

    /// Flushes and closes the container; returns every segment written
    ///
    /// Writes sent before the close are processed first.
    pub async fn close(&self) -> StorageResult<Vec<PathBuf>> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Close { ack })
            .await
            .map_err(|_| StorageError::WriterClosed)?;
        let segments = done.await.map_err(|_| StorageError::WriterClosed)??;

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| StorageError::Database(format!("archive writer panicked: {}", e)))?;
        }
        Ok(segments)
    }
}

struct WriterState {
    segments: SegmentWriter,
    log: SessionLog,
    index: Arc<dyn DedupIndex>,
}

impl WriterState {
    fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Write { result, ack } => {
                    let outcome = self.write(&result);
                    if let Err(e) = &outcome {
                        tracing::error!("Failed to archive {}: {}", result.task.url, e);
                    }
                    let _ = ack.send(outcome);
                }
                Command::Close { ack } => {
                    let _ = ack.send(self.close());
                    return;
                }
            }
        }

        // Every handle dropped without closing
        if let Err(e) = self.close() {
            tracing::error!("Failed to close archive: {}", e);
        }
    }

    fn write(&mut self, result: &FetchResult) -> StorageResult<WriteReceipt> {
        let now = Utc::now();
        let mut receipt = WriteReceipt::default();

        if let (Some(request), Some(response)) = (&result.request, &result.response) {
            let date = warc_date(now);
            let url = &result.task.url;
            let request_record = WarcRecord::request(request, &date);

            let digest = Fingerprint::of_bytes(&response.body);
            let dedup_payload = result.status == FetchStatus::Success && !response.body.is_empty();
            let original = if dedup_payload {
                self.index.lookup_payload(&digest)?
            } else {
                None
            };

            let response_record = match &original {
                Some(original) => {
                    receipt.revisit = true;
                    WarcRecord::revisit(url, response, original, &date)
                }
                None => WarcRecord::response(url, response, &date),
            }
            .concurrent_to(&request_record);
            let request_record = request_record.concurrent_to(&response_record);

            receipt.bytes = self
                .segments
                .write_group(&[request_record, response_record.clone()], &date)?;
            receipt.records = 2;

            if dedup_payload && original.is_none() {
                self.index.record_payload(&PayloadRecord {
                    digest,
                    record_id: response_record.record_id.clone(),
                    target_uri: url.to_string(),
                    date,
                })?;
            }
        }

        self.log.record(result, now)?;
        self.log.flush()?;
        Ok(receipt)
    }

    fn close(&mut self) -> StorageResult<Vec<PathBuf>> {
        self.log.flush()?;
        self.segments.close()?;
        Ok(self.segments.segments())
    }
}
