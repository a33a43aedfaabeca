//! Record Linkage for a Master Patient Index (MPI)
//!
//! A probabilistic patient record linkage service built with Rust.
//!
//! This library provides:
//! - A canonical PII data model with deterministic normalization
//! - Blocking-key derivation and candidate retrieval
//! - A multi-pass matching engine (evaluators, log-odds scoring,
//!   prediction grading, cluster selection)
//! - A tuning engine that estimates per-feature log-odds weights from
//!   labeled pair samples
//! - User-managed algorithm configurations
//! - RESTful API via Axum
//! - PostgreSQL persistence via Diesel

// Module declarations
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod fhir;
pub mod matching;
pub mod models;
pub mod observability;
pub mod tuning;

// Re-exports
pub use error::{Error, Result};
