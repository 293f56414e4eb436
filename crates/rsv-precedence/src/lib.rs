//! rsv-precedence
//!
//! Precedence resolver: exactly one canonical record per resolution key.
//!
//! Decision path per key:
//! - override check (terminal: resolved by override)
//! - tier filter (lowest configured rank survives; unknown tier aborts)
//! - tie-break ladder: as_of → publication_date → completeness → composite key
//! - resolved, or unresolved when there are no candidates (not an error)
//!
//! Deterministic, pure logic. No IO.

mod resolver;
mod types;

pub use resolver::resolve;
pub use types::*;
