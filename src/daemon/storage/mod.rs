//!  Storage is organized through [year_storage::YearStorage] and [interval_store::IntervalStore].
//!  The basic idea is:
//!   - There is a directory with all the records.
//!   - Records are stored in yearly files, each holding a JSON array of intervals sorted by start.
//!   - Closed intervals are first kept as pending and merged into the file on flush.
//!   - Totals are computed from the stored intervals and cached until the next change.

pub mod aggregate;
pub mod consolidate;
pub mod crop;
pub mod entities;
pub mod error;
pub mod interval_store;
pub mod invariant;
pub mod year_storage;
