//! Single-flight materialization of the census table.
//!
//! [`MaterializationCoordinator::ensure_ready`] may be called by any number of
//! concurrent requests. The first caller that finds no table starts a *build
//! episode* (fetch, load, index) on a spawned task; every other caller joins
//! that episode's shared future and receives the same outcome.
//!
//! ```text
//!              start                 success
//! Unstarted ──────────▶ Building ─────────────▶ Ready
//!     ▲                   │  ▲
//!     │                   │  │ next ensure_ready
//!     │           failure ▼  │
//!     └ ─ ─ ─ ─ ─ ─ ─ ─  Failed
//! ```
//!
//! - The starter decision and the recording of the in-flight build happen
//!   under one lock, so two callers can never both start an episode.
//! - Only the build task writes the terminal transition, and it does so
//!   before any waiter observes the outcome.
//! - `Failed` is not sticky: the next call starts a fresh episode from the
//!   fetch step.
//! - Once `Ready`, the table is published through a `OnceCell` and read
//!   without taking the state lock.

#[cfg(test)]
#[path = "tests/mod.rs"]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use futures::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::census_table::CensusTable;
use crate::census_table::projection::KEY_COLUMN;
use crate::error::{LoadError, MaterializeError};
use crate::fetcher::DatasetFetcher;

type BuildOutcome = Result<Arc<CensusTable>, MaterializeError>;
type SharedBuild = Shared<BoxFuture<'static, BuildOutcome>>;

enum MaterializationState {
    Unstarted,
    Building { episode: u64, build: SharedBuild },
    Ready(Arc<CensusTable>),
    Failed { episode: u64, error: MaterializeError },
}

/// Point-in-time view of the coordinator, for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MaterializationStatus {
    Unstarted,
    Building { episode: u64 },
    Ready { rows: usize },
    Failed { episode: u64, error: String },
}

struct CoordinatorInner {
    fetcher: Arc<dyn DatasetFetcher>,
    state: Mutex<MaterializationState>,
    ready: OnceCell<Arc<CensusTable>>,
    episodes: AtomicU64,
}

/// Either the finished table or the episode to wait on.
enum Readiness {
    Ready(Arc<CensusTable>),
    Pending(SharedBuild),
}

/// Owns the census table and the state machine that produces it.
///
/// Construct one per dataset and share it by `Arc`; separate instances are
/// fully independent.
pub struct MaterializationCoordinator {
    inner: Arc<CoordinatorInner>,
    wait_timeout: Option<Duration>,
}

impl MaterializationCoordinator {
    pub fn new(fetcher: Arc<dyn DatasetFetcher>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                fetcher,
                state: Mutex::new(MaterializationState::Unstarted),
                ready: OnceCell::new(),
                episodes: AtomicU64::new(0),
            }),
            wait_timeout: None,
        }
    }

    /// Bounds how long a single caller waits on an in-flight build.
    ///
    /// `None` (the default) waits indefinitely. A caller that gives up gets
    /// [`MaterializeError::Timeout`]; the build keeps running for later callers.
    pub fn with_wait_timeout(mut self, wait_timeout: Option<Duration>) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Returns the ready table, building it first if needed.
    ///
    /// # Errors
    ///
    /// Returns the error of the build episode this call started or joined, or
    /// [`MaterializeError::Timeout`] if the configured wait elapsed first.
    pub async fn ensure_ready(&self) -> Result<Arc<CensusTable>, MaterializeError> {
        let build = match self.join_or_start() {
            Readiness::Ready(table) => return Ok(table),
            Readiness::Pending(build) => build,
        };

        match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, build)
                .await
                .map_err(|_| MaterializeError::Timeout(limit))?,
            None => build.await,
        }
    }

    /// Starts a build episode in the background if none is running or done.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let _ = self.join_or_start();
    }

    /// The table, if materialization has completed.
    pub fn table(&self) -> Option<Arc<CensusTable>> {
        self.inner.ready.get().cloned()
    }

    /// Number of build episodes started so far.
    pub fn build_attempts(&self) -> u64 {
        self.inner.episodes.load(Ordering::Acquire)
    }

    pub fn status(&self) -> MaterializationStatus {
        match &*self.inner.lock_state() {
            MaterializationState::Unstarted => MaterializationStatus::Unstarted,
            MaterializationState::Building { episode, .. } => {
                MaterializationStatus::Building { episode: *episode }
            }
            MaterializationState::Ready(table) => MaterializationStatus::Ready { rows: table.num_rows() },
            MaterializationState::Failed { episode, error } => MaterializationStatus::Failed {
                episode: *episode,
                error: error.to_string(),
            },
        }
    }

    fn join_or_start(&self) -> Readiness {
        if let Some(table) = self.inner.ready.get() {
            return Readiness::Ready(Arc::clone(table));
        }

        let mut state = self.inner.lock_state();
        match &*state {
            MaterializationState::Ready(table) => Readiness::Ready(Arc::clone(table)),
            MaterializationState::Building { episode, build } => {
                debug!(episode, "joining in-flight census build");
                Readiness::Pending(build.clone())
            }
            MaterializationState::Unstarted | MaterializationState::Failed { .. } => {
                let episode = self.inner.episodes.fetch_add(1, Ordering::AcqRel) + 1;
                let build = spawn_build(&self.inner, episode);
                *state = MaterializationState::Building { episode, build: build.clone() };
                Readiness::Pending(build)
            }
        }
    }
}

impl CoordinatorInner {
    fn lock_state(&self) -> MutexGuard<'_, MaterializationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the outcome of `episode`, unless a newer episode has taken over.
    fn finish(&self, episode: u64, outcome: &BuildOutcome) {
        let mut state = self.lock_state();
        let is_current = matches!(
            &*state,
            MaterializationState::Building { episode: running, .. } if *running == episode
        );
        if !is_current {
            return;
        }

        let next = match outcome {
            Ok(table) => {
                let _ = self.ready.set(Arc::clone(table));
                MaterializationState::Ready(Arc::clone(table))
            }
            Err(error) => MaterializationState::Failed { episode, error: error.clone() },
        };
        let previous = std::mem::replace(&mut *state, next);
        drop(state);
        drop(previous);
    }
}

/// Spawns the build sequence for `episode` and returns a future every
/// caller can await.
fn spawn_build(inner: &Arc<CoordinatorInner>, episode: u64) -> SharedBuild {
    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        let outcome = run_build_sequence(task_inner.fetcher.as_ref(), episode).await;
        task_inner.finish(episode, &outcome);
        outcome
    });

    let weak: Weak<CoordinatorInner> = Arc::downgrade(inner);
    async move {
        match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let outcome = Err(MaterializeError::Aborted(join_error.to_string()));
                if let Some(inner) = weak.upgrade() {
                    inner.finish(episode, &outcome);
                }
                outcome
            }
        }
    }
    .boxed()
    .shared()
}

/// Fetch, load, index. Each step's failure aborts the rest.
async fn run_build_sequence(fetcher: &dyn DatasetFetcher, episode: u64) -> BuildOutcome {
    let started = Instant::now();
    info!(episode, "census materialization started");

    let result = async {
        let local = fetcher.ensure_local_copy().await?;
        let local = local.to_string_lossy().into_owned();

        // Decoding and indexing the whole file is CPU bound; keep it off the
        // runtime workers. The reader's I/O still goes through the runtime.
        let runtime = tokio::runtime::Handle::current();
        let table = tokio::task::spawn_blocking(move || {
            let mut table = runtime.block_on(CensusTable::load(&local))?;
            table.create_index(KEY_COLUMN)?;
            Ok::<_, LoadError>(table)
        })
        .await
        .map_err(|e| LoadError::Task(e.to_string()))??;

        Ok::<_, MaterializeError>(Arc::new(table))
    }
    .await;

    match &result {
        Ok(table) => info!(
            episode,
            rows = table.num_rows(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "census materialization ready"
        ),
        Err(error) => warn!(
            episode,
            error = %error,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "census materialization failed"
        ),
    }
    result
}
