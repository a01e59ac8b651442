pub mod index_persistence;

pub use index_persistence::{IndexPersistence, LoadOutcome, FORMAT_VERSION};
