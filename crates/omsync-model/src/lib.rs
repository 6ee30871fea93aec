//! Local mirror of a controller's object model.
//!
//! The controller exposes a hierarchical status tree in named top-level
//! sections ("keys"). This crate holds the cached copy and the pure logic
//! that keeps it current:
//! - [`merge`]: deep merge of partial updates into cached values
//! - [`Snapshot`]: the cached tree, keyed by top-level section
//! - [`SequenceTable`]: per-key change counters and dirty-key detection
//! - [`ModeKeys`] and [`TrackedKeySet`]: which keys matter per machine mode

pub mod error;
pub mod keys;
pub mod merge;
pub mod mode;
pub mod seqs;
pub mod snapshot;
pub mod value;

pub use error::{ModelError, Result};
pub use keys::{TrackedKeySet, SEQS_KEY, STATE_KEY};
pub use merge::merge;
pub use mode::{MachineMode, ModeKeys};
pub use seqs::{SequenceTable, SequencingMode};
pub use snapshot::{Snapshot, UpdateMode};
pub use value::{Map, Value};
