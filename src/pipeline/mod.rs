//! Pipeline entry points.
//!
//! - `run_extract`: Harvest events and participants into dated CSV sinks
//! - `run_merge`: Reconcile harvested records into the final document

pub mod discover;
pub mod extract;
pub mod merge;
pub mod reconcile;

pub use discover::{ResolvedInput, SourceTier, discover};
pub use extract::{ExtractOutcome, run_extract};
pub use merge::{MergeOptions, MergeReport, run_merge};
pub use reconcile::{MatchTier, Reconciled, reconcile};
