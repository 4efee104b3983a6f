//! Reconciliation Orchestrator.
//!
//! Composes the other components into the engine's public operations:
//! snapshot, resolve, analyze affected sections, settle duplicates,
//! renumber, retry deferred corrections, publish.

mod orchestrator;
mod report;

pub use orchestrator::ReconciliationEngine;
pub use report::{
    ConflictEntry, CorrectOptions, CorrectionReport, EngineStatus, IngestOptions, IngestReport,
    RemovalReport, RenumberReport, ResolvedDuplicate, RollbackReport, SectionGap, SectionReport,
    SupersededEntry,
};
