//! Fetch worker loop
//!
//! Each worker repeatedly:
//! 1. Takes the next task from the frontier
//! 2. Skips it if an ignore set matches, otherwise fetches it
//! 3. Extracts links and enqueues the ones in scope
//! 4. Archives the result and records its outcome in the dedup index
//!
//! Per-task failures are recorded and the worker moves on. Storage failures
//! are fatal: the first one is kept as the session's failure reason and the
//! frontier is drained so every worker stops.

use crate::archive::ArchiveWriter;
use crate::crawler::{
    CancelSignal, CookieJar, CrawlHook, CrawlTask, Extractor, FetchResult, FetchStatus, Fetcher, Frontier,
    HostLimiter,
};
use crate::output::SessionStats;
use crate::state::UrlStatus;
use crate::storage::{DedupIndex, StorageResult, UrlOutcome};
use crate::url::{LinkKind, ScopeRules};
use crate::CrawlError;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Everything the workers of one session share
pub(crate) struct Shared {
    pub frontier: Arc<Frontier>,
    pub index: Arc<dyn DedupIndex>,
    pub fetcher: Fetcher,
    pub cookies: Arc<CookieJar>,
    pub limiter: HostLimiter,
    pub scope: ScopeRules,
    pub extractor: Extractor,
    pub writer: ArchiveWriter,
    pub hook: Arc<dyn CrawlHook>,
    pub stats: Arc<SessionStats>,
    /// First fatal error reported by a worker
    pub fatal: Mutex<Option<String>>,
}

impl Shared {
    /// Records a fatal error and stops the crawl; the first reason wins
    pub fn fail(&self, reason: String) {
        tracing::error!("Fatal error, draining crawl: {}", reason);
        let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
        if fatal.is_none() {
            *fatal = Some(reason);
        }
        drop(fatal);
        self.frontier.drain();
    }

    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Runs one worker until the frontier is exhausted, drained, or cancelled
pub(crate) async fn run_worker(id: usize, shared: Arc<Shared>, mut cancel: CancelSignal) {
    tracing::debug!("Worker {} started", id);

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Some(task) = shared.frontier.dequeue().await else {
            break;
        };
        if cancel.is_cancelled() {
            // Still recorded as pending; a resume picks it up
            shared.frontier.task_done();
            break;
        }

        let url = task.url.clone();
        if let Err(e) = handle_task(&shared, task, &mut cancel).await {
            if e.is_fatal() {
                shared.fail(e.to_string());
            } else {
                tracing::warn!("Failed to handle {}: {}", url, e);
            }
        }
        shared.frontier.task_done();
    }

    tracing::debug!("Worker {} finished", id);
}

async fn handle_task(
    shared: &Shared,
    task: CrawlTask,
    cancel: &mut CancelSignal,
) -> Result<(), CrawlError> {
    let mut result = match shared.scope.ignores().matching_set(&task.url) {
        Some(set) => {
            tracing::debug!("Skipping {} (ignore set '{}')", task.url, set);
            FetchResult::skipped(task)
        }
        None => {
            tracing::debug!(
                "Fetching {} (depth {}, requisite: {})",
                task.url,
                task.depth,
                task.is_page_requisite
            );
            match shared.fetcher.fetch(&task, &shared.limiter, cancel).await {
                Some(result) => result,
                None => return Ok(()),
            }
        }
    };

    shared.stats.record_result(&result);
    match result.status {
        FetchStatus::Success => {
            if let Some(response) = &result.response {
                result.links = shared.extractor.extract(&result.task.url, response).collect();
            }
        }
        FetchStatus::Error(kind) => {
            tracing::warn!(
                "Giving up on {} after {} attempt(s): {}",
                result.task.url,
                result.attempts,
                kind
            );
        }
        FetchStatus::Redirect | FetchStatus::Skipped => {}
    }

    // Children are persisted before the parent counts as done
    let admitted = enqueue_discovered(shared, &result)?;
    shared.stats.record_admitted(admitted);

    let result = Arc::new(result);
    let receipt = shared.writer.write(Arc::clone(&result)).await?;
    shared.stats.record_write(&receipt);

    shared
        .index
        .mark_done(&result.task.fingerprint(), &outcome_of(&result))?;
    shared.hook.on_fetch_complete(&result);
    Ok(())
}

/// Classifies the result's links and redirect target and enqueues those in scope
fn enqueue_discovered(shared: &Shared, result: &FetchResult) -> StorageResult<u64> {
    let parent = &result.task;
    let mut candidates: Vec<(Url, LinkKind)> = Vec::new();

    if let Some(target) = result.redirect_target() {
        match shared.extractor.normalize(target) {
            Some(url) => candidates.push((url, LinkKind::Redirect)),
            None => tracing::debug!("Unfollowable redirect from {}", parent.url),
        }
    }
    candidates.extend(result.links.iter().map(|l| (l.url.clone(), l.kind)));

    let mut admitted = 0;
    for (url, kind) in candidates {
        let verdict = shared.scope.classify(parent, &url, kind);
        let verdict = shared.hook.decide_scope(&url, verdict);

        let child = match kind {
            LinkKind::Redirect => parent.redirect_to(url.clone(), verdict),
            LinkKind::Page | LinkKind::Requisite => parent.child(url.clone(), verdict),
        };
        let Some(child) = child else {
            tracing::trace!("Not following {}: {}", url, verdict);
            continue;
        };

        if shared.frontier.enqueue(child)? {
            tracing::trace!("Queued {} ({})", url, verdict);
            admitted += 1;
        }
    }
    Ok(admitted)
}

/// Outcome stored in the dedup index for a handled task
pub(crate) fn outcome_of(result: &FetchResult) -> UrlOutcome {
    let status = match result.status {
        FetchStatus::Success => UrlStatus::Done,
        FetchStatus::Redirect => UrlStatus::Redirect,
        FetchStatus::Error(_) => UrlStatus::Error,
        FetchStatus::Skipped => UrlStatus::Skipped,
    };

    UrlOutcome {
        status,
        status_code: result.status_code(),
        bytes: result.body_len(),
        error: match result.status {
            FetchStatus::Error(kind) => Some(kind.to_string()),
            _ => None,
        },
    }
}
