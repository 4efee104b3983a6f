//! Canonical numbering across sections.

mod sequencer;

pub use sequencer::{CanonicalSequencer, SequenceSummary};
