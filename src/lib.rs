#![forbid(unsafe_code)]

//! Federated-learning participant node.
//!
//! Tracks per-project worker sessions, keeps their records in `SQLite`,
//! and benchmarks the predictions workers report back.

pub mod benchmark;
pub mod config;
pub mod errors;
pub mod export;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod rpc;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
