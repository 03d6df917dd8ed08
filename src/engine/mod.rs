//! Pure reconciliation primitives.
//!
//! Everything in here is deterministic and free of I/O:
//! - `history`: volatile/permanent time-series points
//! - `diff`: field-level differences between two record snapshots
//! - `patch`: the single mutation entry point for records
//!
//! The store and the reconciliation loop are the imperative shell around it.

pub mod diff;
pub mod history;
pub mod patch;
pub mod types;

pub use diff::{record_difference, value_difference, FieldDiff};
pub use history::HistoryPoint;
pub use patch::{apply_patch, patch, Patch, CONTEXT_KEY};
