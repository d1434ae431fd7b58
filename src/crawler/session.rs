//! Crawl session: owns every component of one crawl and drives its lifecycle
//!
//! A session moves through `Initializing -> Running -> Draining -> Terminated`:
//! it opens the dedup index and the archive, queues pending and seed URLs,
//! runs the worker pool until the frontier is exhausted, cancelled, or a
//! fatal error drains it, then closes the archive and flushes the index.

use crate::archive::{ArchiveSettings, ArchiveWriter};
use crate::config::{effective_config_hash, validate, PolicyConfig};
use crate::crawler::worker::{run_worker, Shared};
use crate::crawler::{
    CancelHandle, CookieJar, CrawlHook, CrawlTask, Extractor, Fetcher, Frontier, HostLimiter,
    NoopHook,
};
use crate::output::{CrawlStatistics, SessionStats};
use crate::state::SessionState;
use crate::storage::{self, DedupIndex, RunStatus};
use crate::url::{host_key, normalize_with, IgnoreSets, ScopeRules};
use crate::{ConfigError, CrawlError};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

/// How a crawl ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The frontier ran out of work
    Completed,
    /// Stopped on request; pending URLs stay in the index for a resume
    Cancelled,
    /// Stopped by a storage or configuration failure
    FatalError(String),
}

impl CrawlOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Cancelled => 130,
            Self::FatalError(_) => 1,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn run_status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::Cancelled => RunStatus::Cancelled,
            Self::FatalError(_) => RunStatus::Failed,
        }
    }
}

impl fmt::Display for CrawlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::FatalError(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of [`Session::run`]
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,
    pub stats: CrawlStatistics,
    /// Id of the run record, if one was created
    pub run_id: Option<i64>,
    /// WARC segments written by this session
    pub segments: Vec<PathBuf>,
}

/// One crawl invocation
pub struct Session {
    config: PolicyConfig,
    seeds: Vec<Url>,
    index: Arc<dyn DedupIndex>,
    hook: Arc<dyn CrawlHook>,
    cancel: CancelHandle,
    state: SessionState,
}

impl Session {
    /// Validates the policy and seeds and opens the dedup index
    ///
    /// The output directory is created if needed. An index left by an
    /// earlier session in the same directory is resumed.
    pub fn new<S: AsRef<str>>(config: PolicyConfig, seeds: &[S]) -> crate::Result<Self> {
        validate(&config)?;

        let mut parsed = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let url = normalize_with(seed.as_ref(), config.crawl.strip_session_id)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", seed.as_ref(), e)))?;
            parsed.push(url);
        }
        if parsed.is_empty() {
            return Err(
                ConfigError::Validation("at least one start URL is required".to_string()).into(),
            );
        }

        std::fs::create_dir_all(&config.output.directory)?;
        let index = storage::open_index(&config.output.database_path())?;

        Ok(Self {
            config,
            seeds: parsed,
            index: Arc::new(index),
            hook: Arc::new(NoopHook),
            cancel: CancelHandle::new(),
            state: SessionState::Initializing,
        })
    }

    /// Installs a hook consulted by every worker
    pub fn with_hook(mut self, hook: Arc<dyn CrawlHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Handle that cancels this session from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Normalized seed URLs
    pub fn seeds(&self) -> &[Url] {
        &self.seeds
    }

    pub fn index(&self) -> Arc<dyn DedupIndex> {
        Arc::clone(&self.index)
    }

    /// Returns true if the last run recorded in the index used another policy
    pub fn policy_changed(&self) -> crate::Result<bool> {
        let hash = effective_config_hash(&self.config);
        Ok(self
            .index
            .latest_run()?
            .is_some_and(|run| run.config_hash != hash))
    }

    fn transition(&mut self, next: SessionState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Runs the crawl to its end
    ///
    /// Never panics on crawl failures: fatal errors are reported in the
    /// returned outcome. Running a session twice is an invalid transition.
    pub async fn run(&mut self) -> CrawlReport {
        let started = Instant::now();
        let stats = Arc::new(SessionStats::new());

        let mut report = CrawlReport {
            outcome: CrawlOutcome::Completed,
            stats: CrawlStatistics::default(),
            run_id: None,
            segments: Vec::new(),
        };

        if self.state != SessionState::Initializing {
            let err = CrawlError::InvalidTransition {
                from: self.state,
                to: SessionState::Running,
            };
            report.outcome = CrawlOutcome::FatalError(err.to_string());
            return report;
        }

        let shared = match self.start(&stats, &mut report) {
            Ok(shared) => shared,
            Err(e) => {
                tracing::error!("Failed to start crawl: {}", e);
                report.outcome = CrawlOutcome::FatalError(e.to_string());
                if let Some(run_id) = report.run_id {
                    let _ = self.index.finish_run(run_id, RunStatus::Failed);
                }
                let _ = self.transition(SessionState::Terminated);
                report.stats = stats.snapshot(started.elapsed());
                return report;
            }
        };

        report.outcome = self.crawl(&shared).await;
        self.finish(shared, &mut report).await;

        report.stats = stats.snapshot(started.elapsed());
        tracing::info!(
            "Crawl {} after {:?}: {} handled, {} errors",
            report.outcome,
            report.stats.elapsed,
            report.stats.handled(),
            report.stats.errors
        );
        report
    }

    /// Opens the archive, records the run and fills the frontier
    fn start(
        &self,
        stats: &Arc<SessionStats>,
        report: &mut CrawlReport,
    ) -> crate::Result<Arc<Shared>> {
        if self.policy_changed()? {
            tracing::warn!(
                "Crawl policy differs from the previous run; queued URLs keep their depth, new links follow the new policy"
            );
        }
        let config_hash = effective_config_hash(&self.config);
        let run_id = self.index.create_run(&config_hash)?;
        report.run_id = Some(run_id);
        tracing::info!("Starting crawl run {} of {} seed(s)", run_id, self.seeds.len());

        let writer = ArchiveWriter::spawn(
            ArchiveSettings::from_config(&self.config),
            Arc::clone(&self.index),
        )?;

        let frontier = Arc::new(Frontier::new(&self.config, Arc::clone(&self.index)));
        let pending = self.index.pending()?;
        if !pending.is_empty() {
            tracing::info!("Resuming {} pending URL(s)", pending.len());
            frontier.restore(pending);
        }

        let mut admitted = 0;
        for task in self.seed_tasks() {
            if frontier.enqueue(task)? {
                admitted += 1;
            }
        }
        stats.record_admitted(admitted);

        let ignores = IgnoreSets::from_config(&self.config)?;
        tracing::debug!("Active ignore sets: {:?}", ignores.set_names());

        let cookie_path = self.config.output.cookie_path();
        let cookies = match CookieJar::load(&cookie_path) {
            Ok(jar) => Arc::new(jar),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cookie file {}: {}", cookie_path.display(), e);
                Arc::new(CookieJar::new())
            }
        };

        Ok(Arc::new(Shared {
            frontier,
            index: Arc::clone(&self.index),
            fetcher: Fetcher::with_cookies(&self.config.http, Arc::clone(&cookies))?,
            cookies,
            limiter: HostLimiter::new(Duration::from_millis(self.config.crawl.politeness_delay)),
            scope: ScopeRules::new(&self.config, ignores, &self.seeds),
            extractor: Extractor::new(self.config.crawl.strip_session_id),
            writer,
            hook: Arc::clone(&self.hook),
            stats: Arc::clone(stats),
            fatal: Mutex::new(None),
        }))
    }

    /// Seed tasks plus each seed host's sitemap when enabled
    fn seed_tasks(&self) -> Vec<CrawlTask> {
        let mut tasks: Vec<CrawlTask> = self.seeds.iter().cloned().map(CrawlTask::seed).collect();

        if self.config.crawl.sitemaps {
            let mut hosts = HashSet::new();
            for seed in &self.seeds {
                let Some(host) = host_key(seed) else { continue };
                if !hosts.insert(host) {
                    continue;
                }
                if let Ok(sitemap) = seed.join("/sitemap.xml") {
                    tasks.push(CrawlTask::seed(sitemap));
                }
            }
        }
        tasks
    }

    /// Runs the worker pool; returns once every worker has exited
    async fn crawl(&mut self, shared: &Arc<Shared>) -> CrawlOutcome {
        if let Err(e) = self.transition(SessionState::Running) {
            return CrawlOutcome::FatalError(e.to_string());
        }

        let listener = {
            let frontier = Arc::clone(&shared.frontier);
            let mut signal = self.cancel.subscribe();
            tokio::spawn(async move {
                signal.cancelled().await;
                tracing::info!("Cancellation requested");
                frontier.drain();
            })
        };

        let workers: Vec<_> = (0..self.config.crawl.concurrency as usize)
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(shared), self.cancel.subscribe())))
            .collect();
        tracing::info!("Started {} fetch worker(s)", workers.len());

        for worker in workers {
            if let Err(e) = worker.await {
                shared.fail(format!("fetch worker aborted: {}", e));
            }
        }
        listener.abort();

        if let Err(e) = self.transition(SessionState::Draining) {
            return CrawlOutcome::FatalError(e.to_string());
        }

        if let Some(reason) = shared.fatal_reason() {
            CrawlOutcome::FatalError(reason)
        } else if !shared.frontier.is_exhausted() {
            CrawlOutcome::Cancelled
        } else {
            CrawlOutcome::Completed
        }
    }

    /// Closes the archive, saves cookies, records the run outcome and flushes the index
    async fn finish(&mut self, shared: Arc<Shared>, report: &mut CrawlReport) {
        let cookie_path = self.config.output.cookie_path();
        if let Err(e) = shared.cookies.save(&cookie_path) {
            tracing::warn!("Failed to save cookies to {}: {}", cookie_path.display(), e);
        }

        match shared.writer.close().await {
            Ok(segments) => report.segments = segments,
            Err(e) => {
                tracing::error!("Failed to close archive: {}", e);
                if !matches!(report.outcome, CrawlOutcome::FatalError(_)) {
                    report.outcome = CrawlOutcome::FatalError(e.to_string());
                }
            }
        }

        if let Some(run_id) = report.run_id {
            let finished = self
                .index
                .finish_run(run_id, report.outcome.run_status())
                .and_then(|()| self.index.flush());
            if let Err(e) = finished {
                tracing::error!("Failed to flush dedup index: {}", e);
                if !matches!(report.outcome, CrawlOutcome::FatalError(_)) {
                    report.outcome = CrawlOutcome::FatalError(e.to_string());
                }
            }
        }

        if let Err(e) = self.transition(SessionState::Terminated) {
            tracing::error!("{}", e);
        }
    }
}
