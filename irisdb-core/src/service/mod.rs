use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock as SyncRwLock;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout};

use crate::core::config::IndexConfig;
use crate::core::errors::{IrisError, Result};
use crate::core::types::{ExternalId, InternalId};
use crate::index::FlatIndex;
use crate::mapping::IdentifierMap;
use crate::reconcile::{RebuildSummary, Reconciler};
use crate::records::{FeatureExtractor, RecordStore};
use crate::storage::{IndexPersistence, LoadOutcome};
use crate::vector::distance::DistanceMetric;

/// Service lifecycle. Only `Ready` accepts `add`/`search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Loading,
    Ready,
    Rebuilding,
    ShuttingDown,
    Closed,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Loading => "loading",
            Lifecycle::Ready => "ready",
            Lifecycle::Rebuilding => "rebuilding",
            Lifecycle::ShuttingDown => "shutting_down",
            Lifecycle::Closed => "closed",
        }
    }
}

/// Result of an `add` call. An already-indexed external id is advisory,
/// not an error; idempotent callers treat it as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted(InternalId),
    AlreadyIndexed(InternalId),
}

impl AddOutcome {
    pub fn internal_id(&self) -> InternalId {
        match self {
            AddOutcome::Inserted(id) | AddOutcome::AlreadyIndexed(id) => *id,
        }
    }
}

/// A ranked search hit, translated to the external id space.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub external_id: ExternalId,
    pub score: f32,
}

/// Index statistics.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub vectors: usize,
    pub dim: usize,
    pub metric: DistanceMetric,
    pub state: &'static str,
    pub dirty: bool,
}

struct CoreState {
    index: FlatIndex,
    map: IdentifierMap,
}

/// Facade over the index/mapping pair: single writer, many readers.
///
/// All `add` calls serialize through the write lock, so internal ids stay
/// dense and gap-free; `search` calls share the read lock. Saves are
/// serialized separately and snapshot the pair under the read lock before
/// touching the disk, so a save can never observe a store/map mismatch.
/// Rebuild is exclusive: the lifecycle leaves `Ready` and concurrent
/// requests are rejected with a retryable error until it returns.
pub struct IndexCoordinator<R: RecordStore, E: FeatureExtractor> {
    dim: usize,
    metric: DistanceMetric,
    state: RwLock<CoreState>,
    lifecycle: SyncRwLock<Lifecycle>,
    persistence: IndexPersistence,
    reconciler: Reconciler,
    save_lock: Mutex<()>,
    dirty: AtomicBool,
    records: R,
    extractor: E,
}

impl<R: RecordStore, E: FeatureExtractor> IndexCoordinator<R, E> {
    pub fn new(config: &IndexConfig, records: R, extractor: E) -> Result<Self> {
        let persistence = IndexPersistence::new(&config.data_dir)?;
        let index = FlatIndex::new(config.dim, config.metric)?;
        Ok(IndexCoordinator {
            dim: config.dim,
            metric: config.metric,
            state: RwLock::new(CoreState {
                index,
                map: IdentifierMap::new(),
            }),
            lifecycle: SyncRwLock::new(Lifecycle::Uninitialized),
            persistence,
            reconciler: Reconciler::new(config.dim, config.metric),
            save_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            records,
            extractor,
        })
    }

    /// Load persisted state, falling back to a full rebuild from the
    /// record store when nothing usable is on disk. Transitions to
    /// `Ready` on success; reverts to `Uninitialized` on failure so the
    /// caller can retry.
    pub async fn initialize(&self, rebuild_timeout: Option<Duration>) -> Result<()> {
        self.transition(Lifecycle::Uninitialized, Lifecycle::Loading)?;
        match self.load_or_rebuild(rebuild_timeout).await {
            Ok(()) => {
                self.set_lifecycle(Lifecycle::Ready);
                Ok(())
            }
            Err(e) => {
                self.set_lifecycle(Lifecycle::Uninitialized);
                Err(e)
            }
        }
    }

    async fn load_or_rebuild(&self, rebuild_timeout: Option<Duration>) -> Result<()> {
        match self.persistence.load()? {
            LoadOutcome::Loaded(index, map) => {
                if index.dim() != self.dim || index.metric() != self.metric {
                    tracing::warn!(
                        persisted_dim = index.dim(),
                        configured_dim = self.dim,
                        "persisted index does not match configuration, rebuilding"
                    );
                    self.rebuild_and_install(rebuild_timeout).await?;
                } else {
                    let mut state = self.state.write().await;
                    state.index = index;
                    state.map = map;
                }
            }
            LoadOutcome::NotFound => {
                tracing::info!("no persisted index found, rebuilding from record store");
                self.rebuild_and_install(rebuild_timeout).await?;
            }
            LoadOutcome::Corrupt(reason) => {
                tracing::warn!(%reason, "persisted index rejected, rebuilding from record store");
                self.rebuild_and_install(rebuild_timeout).await?;
            }
        }
        Ok(())
    }

    /// Append a vector for an external id.
    ///
    /// The vector must already be embedded (and normalized, under the
    /// inner-product metric) by the caller layer. Save failures mark the
    /// state dirty and are retried later; they do not fail the add, since
    /// the in-memory index is already correct.
    pub async fn add(&self, vector: &[f32], external_id: ExternalId) -> Result<AddOutcome> {
        self.ensure_ready()?;

        let internal = {
            let mut state = self.state.write().await;
            // Re-check after the lock: a rebuild may have left Ready while
            // this writer was queued.
            self.ensure_ready()?;
            if vector.len() != state.index.dim() {
                return Err(IrisError::DimensionMismatch {
                    expected: state.index.dim(),
                    got: vector.len(),
                });
            }
            if let Ok(existing) = state.map.reverse_lookup(external_id) {
                tracing::debug!(external_id, existing, "external id already indexed");
                return Ok(AddOutcome::AlreadyIndexed(existing));
            }

            let internal = state.map.advance();
            let appended = state.index.append(vector)?;
            if appended != internal {
                tracing::error!(appended, internal, "id assignment diverged; invariant violated");
                return Err(IrisError::DuplicateInternalId(appended));
            }
            state.map.bind(internal, external_id)?;
            internal
        };
        self.dirty.store(true, Ordering::Release);

        if let Err(e) = self.records.mark_indexed(external_id, internal).await {
            tracing::warn!(
                external_id,
                internal,
                error = %e,
                "mark_indexed failed; record store cache is stale until the next rebuild"
            );
        }

        if let Err(e) = self.persist_current().await {
            tracing::error!(error = %e, "save after add failed; state is dirty");
        }

        Ok(AddOutcome::Inserted(internal))
    }

    /// K-nearest-neighbor search over the external id space.
    ///
    /// Returns at most `k` matches, fewer if the index holds fewer
    /// vectors. An internal id that fails translation is dropped and
    /// logged; under the invariants it should never happen.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchMatch>> {
        self.ensure_ready()?;

        let state = self.state.read().await;
        let hits = state.index.knn(query, k)?;
        let mut matches = Vec::with_capacity(hits.len());
        for (internal, score) in hits {
            match state.map.translate(internal) {
                Ok(external_id) => matches.push(SearchMatch { external_id, score }),
                Err(e) => {
                    tracing::error!(internal, error = %e, "dropping untranslatable search hit");
                }
            }
        }
        Ok(matches)
    }

    /// Rebuild the index/mapping pair from the record store, replacing
    /// the current state only on success. On timeout or failure the
    /// partially built pair is discarded and the previous state stands.
    pub async fn rebuild(&self, rebuild_timeout: Option<Duration>) -> Result<RebuildSummary> {
        self.transition(Lifecycle::Ready, Lifecycle::Rebuilding)?;
        let result = self.rebuild_and_install(rebuild_timeout).await;
        self.set_lifecycle(Lifecycle::Ready);
        result
    }

    async fn rebuild_and_install(&self, rebuild_timeout: Option<Duration>) -> Result<RebuildSummary> {
        let rebuild = async {
            let records = self.records.list_active_records().await?;
            let state = self.state.read().await;
            self.reconciler
                .rebuild_from_records(&records, &self.extractor, Some((&state.index, &state.map)))
                .await
        };
        let (index, map, summary) = match rebuild_timeout {
            Some(limit) => timeout(limit, rebuild)
                .await
                .map_err(|_| IrisError::RebuildTimeout)??,
            None => rebuild.await?,
        };

        {
            let mut state = self.state.write().await;
            state.index = index;
            state.map = map;
        }
        self.dirty.store(true, Ordering::Release);

        if let Err(e) = self.persist_current().await {
            tracing::error!(error = %e, "failed to persist rebuilt state; state is dirty");
        }
        Ok(summary)
    }

    /// Persist the current state, retrying with backoff.
    pub async fn flush(&self) -> Result<()> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut delay = Duration::from_millis(50);
        let mut attempt = 1;
        loop {
            match self.persist_current().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= MAX_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "flush attempt failed, retrying");
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }

    /// Flush dirty state and close. Further operations are rejected.
    pub async fn shutdown(&self) -> Result<()> {
        self.transition(Lifecycle::Ready, Lifecycle::ShuttingDown)?;
        let result = if self.dirty.load(Ordering::Acquire) {
            self.flush().await
        } else {
            Ok(())
        };
        if let Err(e) = &result {
            tracing::error!(error = %e, "final flush failed during shutdown");
        }
        self.set_lifecycle(Lifecycle::Closed);
        result
    }

    /// Current index statistics.
    pub async fn info(&self) -> IndexInfo {
        let state = self.state.read().await;
        IndexInfo {
            vectors: state.index.count(),
            dim: state.index.dim(),
            metric: state.index.metric(),
            state: self.lifecycle.read().as_str(),
            dirty: self.dirty.load(Ordering::Acquire),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    /// Serialized snapshot-then-write save. The pair is cloned under the
    /// read lock so writers are blocked only for the copy, not the IO.
    async fn persist_current(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let (index, map) = {
            let state = self.state.read().await;
            (state.index.clone(), state.map.clone())
        };
        match self.persistence.save(&index, &map) {
            Ok(()) => {
                self.dirty.store(false, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        let lifecycle = self.lifecycle.read();
        match *lifecycle {
            Lifecycle::Ready => Ok(()),
            other => Err(IrisError::ServiceUnavailable {
                state: other.as_str(),
            }),
        }
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> Result<()> {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == from {
            *lifecycle = to;
            Ok(())
        } else {
            Err(IrisError::ServiceUnavailable {
                state: lifecycle.as_str(),
            })
        }
    }

    fn set_lifecycle(&self, to: Lifecycle) {
        *self.lifecycle.write() = to;
    }
}

#[cfg(test)]
mod tests;
