//! Scrivo core - pipeline logic for turning recorded media into notes.
//!
//! This crate contains all business logic with zero UI dependencies.
//! A recording moves through five stages (ingest, transcribe, refine,
//! generate, organize); the orchestrator drives them, the store persists
//! job state, and providers supply the model transports.

pub mod config;
pub mod engine;
pub mod logging;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod providers;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
