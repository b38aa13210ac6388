//! Utilities Module - shared infrastructure
//!
//! Contains helper functions used across the codebase:
//! - `canonical`: sorted-key compact JSON + SHA-256 fingerprints

pub mod canonical;

// Re-export public helpers
pub use canonical::{canonical_json, sha256_hex};
