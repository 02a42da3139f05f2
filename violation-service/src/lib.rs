//! Violation Aggregation Service
//!
//! HTTP surface for the proctoring backend:
//!
//! - Upsert violation deltas into per-(exam, email) cheating logs
//! - List logs per exam, with a derived analytics view
//! - Gate question access on the exam window and attempt state
//! - Verify exam access codes
//!
pub mod config;
pub mod error;
pub mod gate;
pub mod log;
pub mod routes;
