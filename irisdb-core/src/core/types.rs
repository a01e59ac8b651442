/// Position of a vector inside the index. Dense, monotonically increasing,
/// assigned exactly once and never reused.
pub type InternalId = u64;

/// Primary key of the authoritative record store. Stable for the lifetime
/// of the entity; the record store may soft-delete it without the index
/// ever seeing a removal.
pub type ExternalId = i64;
