//! rsv-runtime
//!
//! One resolution run, end to end:
//!
//! FACTS -> PREFLIGHT -> LEVELS (staged) -> GROUP BY KEY -> RESOLVE (parallel) -> COMMIT LEVELS
//!
//! - Preflight rejects unknown tiers before any level state moves.
//! - Level moves reach the caller's store only after every key resolved.
//! - Every key is resolved over its complete candidate set.
//! - A fatal condition on any key aborts the whole run; the error reported is
//!   the one on the smallest key, so the outcome does not depend on scheduling.
//! - Diagnostics are written only for a completed run.

mod engine;

pub use engine::{emit_diagnostics, preflight, run, RunOutput, RunReport};
