//! Correction Applier: explicit field-level overrides with provenance.
//!
//! Fixes are expressed as data. A [`Correction`] names its target record by
//! stable id, record handle, or section position and carries only the fields
//! to overwrite; the [`CorrectionApplier`] writes them, logs old and new
//! values, and reports targets that do not exist instead of creating them
//! (unless create-missing semantics are requested).

mod applier;
mod correction;

pub use applier::CorrectionApplier;
pub use correction::{Correction, CorrectionOutcome, CorrectionRef, FieldChange};
