//! media-conductor - Unified control surface for asynchronous media inputs
//!
//! This crate coordinates independently-initializing media input sources
//! (camera video, microphone audio) and ML tracking pipelines (hand, body,
//! face landmark detection) behind a single orchestrator. Tracking pipelines
//! depend on a live camera stream and a ready video surface; the orchestrator
//! enforces that dependency, sequences start/stop across sources, isolates
//! per-source failures, and limits automatic tracking restarts to one attempt
//! per camera cycle.

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod surface;
pub mod utils;

pub use error::{MediaError, Result};
