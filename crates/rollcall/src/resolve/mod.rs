//! Identity Resolver: classifies incoming records as matched, new,
//! conflicting, or rejected.

mod resolution;
mod resolver;

pub use resolution::{
    Conflict, ConflictReason, MatchRule, Matched, RejectReason, Rejected, Resolution, Unmatched,
};
pub use resolver::IdentityResolver;
