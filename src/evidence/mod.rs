//! Evidence Module - REF() results as canonical, hashed evidence
//!
//! - `canonical`: field whitelist, truncation, ordering, hashing
//! - `resolver`: registry lookup + workflow call for a REF argument

mod canonical;
mod resolver;

pub use canonical::{
    canonicalize, evidence_hash, evidence_json, truncate_text, EvidenceItem, MAX_TEXT_CHARS,
};
pub use resolver::{RefResolver, ResolvedEvidence};
