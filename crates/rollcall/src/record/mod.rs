//! Record data model: the entity, its field values, quality tags, and
//! provenance log.
//!
//! Records are produced by the extraction stage and changed only through the
//! engine's controlled operations. Every field mutation goes through
//! [`Record::set_field`], which appends to the record's provenance log.

mod provenance;
mod record;
mod value;

pub use provenance::{ProvenanceEntry, ProvenanceOp, QualityTag};
pub use record::{Record, RecordId, RecordRef, SupersededBy};
pub use value::FieldValue;
