//! Durable run state and tabular outputs.
//!
//! ## Directory Structure
//!
//! ```text
//! output/
//! ├── checkpoint.json                # Completed / in-progress events
//! ├── events_YYYY-MM-DD.csv          # One row per event (entity level)
//! ├── participants_YYYY-MM-DD.csv    # One row per participant
//! └── participants_final.json        # Reconciled document
//! ```

pub mod checkpoint;
pub mod sink;

// Re-export for convenience
pub use checkpoint::{Checkpoint, CheckpointState, CheckpointSummary, FailureRecord};
pub use sink::{TabularSink, append_row};
