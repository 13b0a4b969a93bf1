//! Observable orchestrator state
//!
//! Point-in-time snapshots of the full coordination state, for UIs that
//! render it. Partial success (camera up, microphone down) is representable
//! and intentional, never collapsed into one boolean.

use serde::Serialize;
use std::collections::HashMap;

use crate::engine::{DetectionResult, EngineKind};

/// Per-engine observable state
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Whether the per-frame detection loop is running
    pub tracking: bool,
    /// Whether an explicit start request is in flight
    pub starting: bool,
    /// Whether the external renderer has bound a surface for this engine
    pub surface_bound: bool,
    /// Whether the user explicitly stopped this engine (suppresses
    /// automatic restart while the camera stays on)
    pub user_stopped: bool,
    /// Most recent start failure for this engine
    pub last_error: Option<String>,
    /// Most recent frame's detection output
    pub last_data: Option<DetectionResult>,
}

/// Snapshot of the complete orchestrator state
#[derive(Debug, Clone, Serialize)]
pub struct MediaSnapshot {
    /// Whether the microphone holds a live stream
    pub audio_active: bool,
    /// Whether the camera holds a live stream
    pub video_active: bool,
    /// Whether any capture source is active
    pub media_active: bool,
    /// Identifier of the live camera stream, if any
    pub video_stream_id: Option<String>,
    /// Identifier of the live microphone stream, if any
    pub audio_stream_id: Option<String>,
    /// Most recent camera acquisition failure
    pub video_error: Option<String>,
    /// Most recent microphone acquisition failure
    pub audio_error: Option<String>,
    /// Aggregate failure text of the most recent start cycle
    pub aggregate_error: Option<String>,
    /// Whether a global start cycle is in progress
    pub starting: bool,
    /// Per-engine state, keyed by modality
    pub engines: HashMap<EngineKind, EngineStatus>,
}

impl MediaSnapshot {
    /// Convenience accessor for one engine's status
    pub fn engine(&self, kind: EngineKind) -> Option<&EngineStatus> {
        self.engines.get(&kind)
    }
}
