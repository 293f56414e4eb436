//! rsv-levels
//!
//! Level History Store: remembers the last cumulative level per lineage and
//! turns each new level report into a monthly delta.
//!
//! The decision itself ([`evaluate_delta`]) is pure; the stores only add
//! per-lineage write serialization and persistence around it.
//! [`StagedLevelStore`] buffers a run's writes so they land all at once or
//! not at all.

mod convert;
mod delta;
mod staged;
mod store;

pub use convert::{apply_levels, ConversionReport, ConversionStats};
pub use delta::{evaluate_delta, DeltaOutcome, LevelHistoryEntry, LevelPolicy};
pub use staged::StagedLevelStore;
pub use store::{FileLevelStore, InMemoryLevelStore, LevelHistoryStore, SNAPSHOT_SCHEMA_VERSION};
