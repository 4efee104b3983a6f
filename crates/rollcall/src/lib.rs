//! rollcall: reconciliation and canonical sequencing for OCR-extracted rolls.
//!
//! Extraction delivers records section by section, with noisy identifiers,
//! missing entries and duplicate claims on the same printed sequence number.
//! rollcall merges those batches into one dataset with a single dense
//! canonical numbering, without ever losing a record or a change.
//!
//! # Core Principles
//!
//! - **Snapshot before mutate**: every change is preceded by an immutable,
//!   digest-verified snapshot
//! - **Nothing silently overwritten**: identity conflicts are reported, and
//!   corrections touch only the fields they name
//! - **Full provenance**: every field change is logged with old and new value
//! - **Deterministic**: duplicate winners and canonical indexes depend only on
//!   record content and section order
//!
//! # Example
//!
//! ```
//! use rollcall::{EngineConfig, IncomingRecord, IngestOptions, ReconciliationEngine};
//!
//! let engine = ReconciliationEngine::in_memory(EngineConfig::default()).unwrap();
//! let batch = vec![
//!     IncomingRecord::new("W7B1").with_declared_sequence(1).with_stable_id("X1").with_field("name", "Asha"),
//!     IncomingRecord::new("W7B1").with_declared_sequence(3).with_field("name", "Ravi"),
//! ];
//!
//! let report = engine.ingest_batch("W7B1", batch, &IngestOptions::new()).unwrap();
//! assert_eq!(report.added, 2);
//! assert_eq!(report.gaps.len(), 1);
//! assert_eq!(report.canonical_count, 2);
//! ```

pub mod analysis;
pub mod config;
pub mod correction;
pub mod dataset;
pub mod error;
pub mod input;
pub mod record;
pub mod resolve;
pub mod sequence;
pub mod snapshot;
pub mod store;

mod engine;

pub use analysis::{DuplicateGroup, GapDuplicateAnalyzer, SectionAnalysis, TieBreakRule};
pub use config::{EngineConfig, ResolverConfig};
pub use correction::{Correction, CorrectionApplier, CorrectionOutcome, CorrectionRef, FieldChange};
pub use dataset::{Dataset, SequenceRange};
pub use engine::{
    ConflictEntry, CorrectOptions, CorrectionReport, EngineStatus, IngestOptions, IngestReport,
    ReconciliationEngine, RemovalReport, RenumberReport, ResolvedDuplicate, RollbackReport,
    SectionGap, SectionReport, SupersededEntry,
};
pub use error::{Result, RollcallError};
pub use input::IncomingRecord;
pub use record::{FieldValue, ProvenanceEntry, ProvenanceOp, QualityTag, Record, RecordId, RecordRef};
pub use resolve::{IdentityResolver, Resolution};
pub use sequence::CanonicalSequencer;
pub use snapshot::{SnapshotHandle, SnapshotManager};
pub use store::{DatasetStore, FileStore, MemoryStore, SnapshotStore};
