//! URL frontier: the breadth-first queue of pending crawl tasks
//!
//! This module handles:
//! - Admission of new tasks against depth limits and the dedup index
//! - Breadth-first ordering by link depth, FIFO within a depth
//! - Blocking dequeue for the worker pool
//! - Completion detection (empty queue, nothing in flight)
//! - Draining on cancellation or fatal errors

use crate::config::{MaxDepth, PolicyConfig};
use crate::crawler::CrawlTask;
use crate::storage::{DedupIndex, StorageResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Lifecycle of the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontierState {
    /// Accepting and handing out tasks
    Open,
    /// No more admissions; remaining tasks are still handed out
    Closed,
    /// No more admissions and no more tasks handed out
    Draining,
}

struct Inner {
    /// Tasks keyed by link depth; each depth is FIFO
    queues: BTreeMap<u32, VecDeque<CrawlTask>>,
    queued: usize,
    in_flight: usize,
    state: FrontierState,
    /// Set when the frontier closed itself because all work was done
    exhausted: bool,
}

/// Prioritized, deduplicated queue shared by all fetch workers
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
    index: Arc<dyn DedupIndex>,
    max_depth: MaxDepth,
    page_requisite_depth: u32,
}

impl Frontier {
    pub fn new(config: &PolicyConfig, index: Arc<dyn DedupIndex>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queues: BTreeMap::new(),
                queued: 0,
                in_flight: 0,
                state: FrontierState::Open,
                exhausted: false,
            }),
            notify: Notify::new(),
            index,
            max_depth: config.crawl.max_depth,
            page_requisite_depth: config.crawl.page_requisite_depth,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if the task's depth is within the policy limits
    pub fn within_limits(&self, task: &CrawlTask) -> bool {
        if task.is_page_requisite {
            task.depth <= self.page_requisite_depth
        } else {
            self.max_depth.allows(task.depth)
        }
    }

    /// Admits a task if its fingerprint is unseen and its depth is allowed
    ///
    /// The fingerprint is recorded in the dedup index at admission time, so a
    /// URL is never queued twice even while its first fetch is in flight.
    /// Returns whether the task was queued; only storage failures are errors.
    ///
    /// While draining, new tasks are recorded as pending in the index but not
    /// queued, so links found by the last in-flight fetches survive a resume.
    pub fn enqueue(&self, task: CrawlTask) -> StorageResult<bool> {
        if !self.within_limits(&task) {
            tracing::trace!("Depth limit rejects {}", task.url);
            return Ok(false);
        }

        let mut inner = self.lock();
        match inner.state {
            FrontierState::Open => {}
            FrontierState::Draining => {
                self.index.admit(&task)?;
                return Ok(false);
            }
            FrontierState::Closed => return Ok(false),
        }

        // Admission happens under the queue lock so the index and the queue agree
        if !self.index.admit(&task)? {
            return Ok(false);
        }

        inner.push(task);
        drop(inner);
        self.notify.notify_waiters();
        Ok(true)
    }

    /// Re-queues tasks loaded from the index on resume
    ///
    /// Fingerprints are already recorded, so they are not checked again.
    pub fn restore(&self, tasks: Vec<CrawlTask>) -> usize {
        let mut inner = self.lock();
        let count = tasks.len();
        for task in tasks {
            inner.push(task);
        }
        drop(inner);
        self.notify.notify_waiters();
        count
    }

    /// Waits for the next task
    ///
    /// Returns None once the frontier is draining, or closed and empty.
    pub async fn dequeue(&self) -> Option<CrawlTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                match inner.state {
                    FrontierState::Draining => return None,
                    FrontierState::Open | FrontierState::Closed => {}
                }

                if let Some(task) = inner.pop() {
                    inner.in_flight += 1;
                    return Some(task);
                }

                if inner.state == FrontierState::Closed {
                    return None;
                }

                if inner.in_flight == 0 {
                    inner.state = FrontierState::Closed;
                    inner.exhausted = true;
                    drop(inner);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks a dequeued task as fully handled
    ///
    /// When the queue is empty and nothing is in flight, the frontier closes
    /// itself and every waiting worker is released.
    pub fn task_done(&self) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if inner.in_flight == 0 && inner.queued == 0 && inner.state == FrontierState::Open {
            inner.state = FrontierState::Closed;
            inner.exhausted = true;
            tracing::debug!("Frontier exhausted");
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Stops admissions; queued tasks are still handed out
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.state == FrontierState::Open {
            inner.state = FrontierState::Closed;
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Stops admissions and hands out nothing more
    ///
    /// Queued tasks stay recorded as pending in the index for a later resume.
    pub fn drain(&self) {
        let mut inner = self.lock();
        if inner.state != FrontierState::Draining {
            tracing::info!(
                "Frontier draining with {} queued and {} in flight",
                inner.queued,
                inner.in_flight
            );
            inner.state = FrontierState::Draining;
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn state(&self) -> FrontierState {
        self.lock().state
    }

    /// Returns true if the frontier ran out of work on its own
    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.lock().queued
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

impl Inner {
    fn push(&mut self, task: CrawlTask) {
        self.queues.entry(task.link_depth).or_default().push_back(task);
        self.queued += 1;
    }

    fn pop(&mut self) -> Option<CrawlTask> {
        let mut entry = self.queues.first_entry()?;
        let task = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if task.is_some() {
            self.queued -= 1;
        }
        task
    }
}
