//! Gap/Duplicate Analyzer.
//!
//! Works one section at a time. Missing declared sequences are reported as
//! gaps (and optionally held open by placeholders); positions claimed by
//! several active records are settled by a deterministic tie-break, with the
//! losers kept as superseded records rather than deleted.

mod analyzer;
mod tiebreak;

pub use analyzer::{DuplicateGroup, GapDuplicateAnalyzer, SectionAnalysis};
pub use tiebreak::{compare, compare_with_rule, TieBreakRule};
