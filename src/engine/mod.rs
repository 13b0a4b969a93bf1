//! Tracking engines
//!
//! A tracking engine owns one ML inference pipeline: it consumes a video
//! surface and emits structured per-frame detections. Hands, body and face
//! are structurally identical: one [`TrackingEngine`] trait, one shared
//! [`LandmarkEngine`](landmark::LandmarkEngine) implementation, parameterized
//! only by the injected [`Detector`] (which carries the model asset and the
//! per-modality result shaping).

pub mod landmark;

pub use landmark::LandmarkEngine;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::Result;
use crate::surface::SurfaceHandle;

/// Tracking modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Hands,
    Body,
    Face,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Hands => "hands",
            EngineKind::Body => "body",
            EngineKind::Face => "face",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected landmark point, normalized to the surface dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One detected subject (a hand, a body, a face): its landmark points plus
/// an optional per-set label such as handedness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    /// Per-set label, e.g. "Left"/"Right" for hands
    pub label: Option<String>,
    /// Detection confidence, 0.0 - 1.0
    pub score: f32,
    pub points: Vec<Landmark>,
}

/// Auxiliary classification attached to a frame, e.g. a recognized gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

/// Structured output of one successful detection call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub kind: EngineKind,
    /// Detected subjects; empty when nothing is in frame
    pub landmark_sets: Vec<LandmarkSet>,
    /// Auxiliary per-frame classifications (gestures, expressions)
    pub classifications: Vec<Classification>,
    pub timestamp: DateTime<Utc>,
}

impl DetectionResult {
    /// Result with no detected subjects
    pub fn empty(kind: EngineKind) -> Self {
        Self {
            kind,
            landmark_sets: Vec::new(),
            classifications: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Whether at least one subject was detected in this frame
    pub fn has_detection(&self) -> bool {
        !self.landmark_sets.is_empty()
    }
}

/// ML inference seam
///
/// Implemented externally per modality. The model asset, its asynchronous
/// initialization, and the per-modality result shaping all live behind this
/// trait; the engine only asks whether the model finished loading and runs
/// one detection per frame.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Which modality this detector serves
    fn kind(&self) -> EngineKind;

    /// Whether the detection model finished its asynchronous initialization
    fn is_initialized(&self) -> bool;

    /// Run one detection against the current surface frame
    async fn detect(&self, surface: &SurfaceHandle) -> Result<DetectionResult>;
}

/// Frame pacing seam
///
/// In a UI host this is the per-frame animation callback (vsync-aligned);
/// in a headless target it is a fixed-rate timer ([`IntervalScheduler`]) or
/// an explicitly stepped source ([`ManualScheduler`]). The engine's loop
/// contract (skip-if-not-ready, continue-on-per-frame-error,
/// stop-immediately-on-flag-flip) holds regardless of scheduler.
#[async_trait]
pub trait FrameScheduler: Send + Sync {
    /// Wait until the next frame should be processed
    async fn next_frame(&self);
}

/// Fixed-rate frame scheduler for non-UI targets
pub struct IntervalScheduler {
    period: Duration,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Scheduler approximating the given frame rate
    pub fn with_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs(1) / fps.max(1))
    }
}

#[async_trait]
impl FrameScheduler for IntervalScheduler {
    async fn next_frame(&self) {
        tokio::time::sleep(self.period).await;
    }
}

/// Pull-based frame scheduler advanced one frame at a time
///
/// Each `tick()` releases exactly one pending `next_frame()` call. Useful
/// where the consumer drives frames explicitly, and in tests.
#[derive(Default)]
pub struct ManualScheduler {
    notify: Notify,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release one pending frame
    pub fn tick(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl FrameScheduler for ManualScheduler {
    async fn next_frame(&self) {
        self.notify.notified().await;
    }
}

/// Common capability set of all tracking engines
///
/// The orchestrator interacts with hands, body and face exclusively through
/// this trait. `stop_tracking` is synchronous and idempotent; `start_tracking`
/// is idempotent when already tracking.
#[async_trait]
pub trait TrackingEngine: Send + Sync {
    /// Which modality this engine tracks
    fn kind(&self) -> EngineKind;

    /// Whether the per-frame detection loop is running
    fn is_tracking(&self) -> bool;

    /// Most recent frame's output, cleared on stop
    fn last_data(&self) -> Option<DetectionResult>;

    /// Begin the per-frame detection loop against the given surface
    ///
    /// Fails with `EngineNotReady` if the model has not finished loading.
    /// A start while already tracking is a no-op success.
    async fn start_tracking(&self, surface: SurfaceHandle) -> Result<()>;

    /// Halt the frame loop and clear per-session state. Idempotent.
    fn stop_tracking(&self);

    /// Wait for the first successful detection of the current tracking
    /// session
    ///
    /// Resolves immediately if one already happened. A readiness signal
    /// distinct from "tracking started".
    async fn first_detection(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_serialization() {
        assert_eq!(serde_json::to_string(&EngineKind::Hands).unwrap(), "\"hands\"");
        assert_eq!(EngineKind::Face.to_string(), "face");
    }

    #[test]
    fn test_detection_result_empty() {
        let result = DetectionResult::empty(EngineKind::Body);
        assert!(!result.has_detection());
        assert_eq!(result.kind, EngineKind::Body);
    }

    #[tokio::test]
    async fn test_manual_scheduler_releases_one_frame_per_tick() {
        let scheduler = ManualScheduler::new();

        scheduler.tick();
        // First wait consumes the stored permit
        scheduler.next_frame().await;

        // Second wait must block until the next tick
        let second = tokio::time::timeout(Duration::from_millis(20), scheduler.next_frame());
        assert!(second.await.is_err());
    }

    #[tokio::test]
    async fn test_interval_scheduler_paces_frames() {
        tokio::time::pause();
        let scheduler = IntervalScheduler::with_fps(30);

        let start = tokio::time::Instant::now();
        scheduler.next_frame().await;
        assert!(start.elapsed() >= Duration::from_millis(33));
    }
}
