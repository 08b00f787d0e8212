//! Session orchestration modules.
//!
//! Covers per-project serialization, the in-memory process registry, and
//! the lifecycle manager that keeps it in step with the record store.

pub mod lifecycle;
pub mod locks;
pub mod registry;
