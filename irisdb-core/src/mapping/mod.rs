use std::collections::HashMap;

use crate::core::errors::{ErrorCode, IrisError, Result};
use crate::core::types::{ExternalId, InternalId};

/// Bidirectional internal/external identifier table.
///
/// Forward and reverse maps are maintained together as one invariant unit:
/// each internal id maps to exactly one external id, set once; each
/// external id that has ever been inserted maps back to exactly one
/// internal id. `next_internal_id` is strictly increasing and never
/// decreases across restarts.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    forward: HashMap<InternalId, ExternalId>,
    reverse: HashMap<ExternalId, InternalId>,
    next_internal_id: InternalId,
}

impl IdentifierMap {
    pub fn new() -> Self {
        IdentifierMap::default()
    }

    /// Rebuild a map from persisted `(internal, external)` pairs.
    ///
    /// The pairs must be dense and ascending from zero with
    /// `next_internal_id` one past the last entry; anything else means the
    /// persisted artifact cannot be trusted.
    pub fn from_entries(
        next_internal_id: InternalId,
        entries: &[(InternalId, ExternalId)],
    ) -> Result<Self> {
        let mut map = IdentifierMap::new();
        for (expected, (internal, external)) in entries.iter().enumerate() {
            if *internal != expected as InternalId {
                return Err(IrisError::StorageError {
                    code: ErrorCode::MappingCorrupted,
                    message: format!(
                        "mapping entries not dense: expected internal id {}, found {}",
                        expected, internal
                    ),
                });
            }
            map.bind(*internal, *external)?;
            map.advance();
        }
        if next_internal_id != entries.len() as InternalId {
            return Err(IrisError::StorageError {
                code: ErrorCode::MappingCorrupted,
                message: format!(
                    "next_internal_id {} disagrees with {} entries",
                    next_internal_id,
                    entries.len()
                ),
            });
        }
        Ok(map)
    }

    /// Bind an internal id to an external id.
    ///
    /// A duplicate external id is a caller error (deduplicate upstream).
    /// A duplicate internal id should be unreachable under sequential
    /// assignment and is treated as a fatal invariant violation.
    pub fn bind(&mut self, internal: InternalId, external: ExternalId) -> Result<()> {
        if self.reverse.contains_key(&external) {
            return Err(IrisError::DuplicateExternalId(external));
        }
        if self.forward.contains_key(&internal) {
            tracing::error!(internal, "internal id bound twice; invariant violated");
            return Err(IrisError::DuplicateInternalId(internal));
        }
        self.forward.insert(internal, external);
        self.reverse.insert(external, internal);
        Ok(())
    }

    /// Translate an internal id to its external id.
    pub fn translate(&self, internal: InternalId) -> Result<ExternalId> {
        self.forward
            .get(&internal)
            .copied()
            .ok_or(IrisError::UnknownInternalId(internal))
    }

    /// Look up the internal id bound to an external id. Used to detect
    /// "already indexed" before re-embedding.
    pub fn reverse_lookup(&self, external: ExternalId) -> Result<InternalId> {
        self.reverse
            .get(&external)
            .copied()
            .ok_or(IrisError::UnknownExternalId(external))
    }

    /// The next internal id to assign.
    pub fn next_id(&self) -> InternalId {
        self.next_internal_id
    }

    /// Claim the next internal id. Caller holds the single-writer lock.
    pub fn advance(&mut self) -> InternalId {
        let id = self.next_internal_id;
        self.next_internal_id += 1;
        id
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// All external ids present in the reverse map, sorted.
    pub fn external_ids(&self) -> Vec<ExternalId> {
        let mut ids: Vec<ExternalId> = self.reverse.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Forward entries in ascending internal-id order, for persistence.
    pub fn entries(&self) -> Vec<(InternalId, ExternalId)> {
        let mut entries: Vec<(InternalId, ExternalId)> =
            self.forward.iter().map(|(i, e)| (*i, *e)).collect();
        entries.sort_unstable_by_key(|(i, _)| *i);
        entries
    }

    /// Verify the invariant set against the index's vector count.
    pub fn check_invariants(&self, store_count: usize) -> Result<()> {
        if self.forward.len() != self.reverse.len() {
            return Err(IrisError::StorageError {
                code: ErrorCode::MappingCorrupted,
                message: format!(
                    "forward/reverse size mismatch: {} vs {}",
                    self.forward.len(),
                    self.reverse.len()
                ),
            });
        }
        if self.forward.len() != store_count {
            return Err(IrisError::StorageError {
                code: ErrorCode::MappingCorrupted,
                message: format!(
                    "mapping holds {} entries but index holds {} vectors",
                    self.forward.len(),
                    store_count
                ),
            });
        }
        for i in 0..store_count as InternalId {
            let external = self.translate(i)?;
            if self.reverse_lookup(external)? != i {
                return Err(IrisError::StorageError {
                    code: ErrorCode::MappingCorrupted,
                    message: format!("reverse map disagrees for internal id {}", i),
                });
            }
        }
        if self.next_internal_id != store_count as InternalId {
            return Err(IrisError::StorageError {
                code: ErrorCode::MappingCorrupted,
                message: format!(
                    "next_internal_id {} disagrees with {} stored vectors",
                    self.next_internal_id, store_count
                ),
            });
        }
        Ok(())
    }
}
