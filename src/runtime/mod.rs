//! Runtime Module - per-session state
//!
//! - `registry`: named sources and policies (DEFINE statements)
//! - `session`: settings, INTO variables, owning the registry
//!
//! Sessions are explicit values; nothing here is process-global.

mod registry;
mod session;

pub use registry::Registry;
pub use session::Session;
