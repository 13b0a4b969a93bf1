//! Media event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::capture::CaptureKind;
use crate::engine::{DetectionResult, EngineKind};

/// Media event enumeration
///
/// All events are tagged with their event name for serialization.
/// The `serde(tag = "event", content = "data")` attribute creates a
/// JSON structure like:
/// ```json
/// {
///   "event": "capture.started",
///   "data": { "kind": "video" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum MediaEvent {
    // ========================================================================
    // Capture Source Events
    // ========================================================================
    /// The stream held by a capture source changed (acquired or released)
    #[serde(rename = "capture.stream_changed")]
    CaptureStreamChanged {
        /// Capture modality
        kind: CaptureKind,
        /// New stream identifier, None when the stream was released
        stream_id: Option<String>,
    },

    /// A capture source acquired its device and became active
    #[serde(rename = "capture.started")]
    CaptureStarted { kind: CaptureKind },

    /// A capture source released its device and became inactive
    #[serde(rename = "capture.stopped")]
    CaptureStopped { kind: CaptureKind },

    /// Device acquisition or capture failed
    #[serde(rename = "capture.error")]
    CaptureError {
        kind: CaptureKind,
        /// Human-readable reason
        reason: String,
        /// Error code: "capture_unavailable", etc.
        code: String,
    },

    // ========================================================================
    // Tracking Engine Events
    // ========================================================================
    /// An engine's per-frame detection loop started
    #[serde(rename = "engine.started")]
    EngineStarted { kind: EngineKind },

    /// An engine's per-frame detection loop stopped
    #[serde(rename = "engine.stopped")]
    EngineStopped { kind: EngineKind },

    /// One frame produced a detection result
    #[serde(rename = "engine.data")]
    EngineData {
        kind: EngineKind,
        result: DetectionResult,
    },

    /// First successful detection of the current tracking session
    ///
    /// A readiness signal distinct from `engine.started`: tracking can run
    /// for a while before the model sees a valid subject in frame.
    #[serde(rename = "engine.first_detection")]
    EngineFirstDetection { kind: EngineKind },

    /// Engine start failure or per-frame detection failure
    #[serde(rename = "engine.error")]
    EngineError {
        kind: EngineKind,
        /// Human-readable reason
        reason: String,
        /// Error code: "engine_not_ready", "frame_detection",
        /// "precondition_unmet", "surface_not_ready"
        code: String,
    },

    // ========================================================================
    // Orchestrator Events
    // ========================================================================
    /// A surface handle was bound or cleared for an engine
    #[serde(rename = "orchestrator.surface_bound")]
    SurfaceBound { kind: EngineKind, bound: bool },

    /// A global start cycle began
    #[serde(rename = "orchestrator.starting")]
    MediaStarting,

    /// A global start cycle settled, possibly with partial failure
    #[serde(rename = "orchestrator.settled")]
    MediaSettled {
        /// Aggregate error text, None on full success
        error: Option<String>,
    },

    /// All media was stopped
    #[serde(rename = "orchestrator.stopped")]
    MediaStopped,
}

impl MediaEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CaptureStreamChanged { .. } => "capture.stream_changed",
            Self::CaptureStarted { .. } => "capture.started",
            Self::CaptureStopped { .. } => "capture.stopped",
            Self::CaptureError { .. } => "capture.error",
            Self::EngineStarted { .. } => "engine.started",
            Self::EngineStopped { .. } => "engine.stopped",
            Self::EngineData { .. } => "engine.data",
            Self::EngineFirstDetection { .. } => "engine.first_detection",
            Self::EngineError { .. } => "engine.error",
            Self::SurfaceBound { .. } => "orchestrator.surface_bound",
            Self::MediaStarting => "orchestrator.starting",
            Self::MediaSettled { .. } => "orchestrator.settled",
            Self::MediaStopped => "orchestrator.stopped",
        }
    }

    /// Check if event name matches a topic pattern
    ///
    /// Supports wildcards:
    /// - `*` matches all events
    /// - `capture.*` matches all capture events
    /// - `capture.started` matches the exact event
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        if topic.ends_with(".*") {
            let prefix = topic.trim_end_matches(".*");
            event_name.starts_with(prefix)
        } else {
            event_name == topic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name() {
        let event = MediaEvent::CaptureStarted {
            kind: CaptureKind::Video,
        };
        assert_eq!(event.event_name(), "capture.started");

        let event = MediaEvent::EngineError {
            kind: EngineKind::Face,
            reason: "inference failed".to_string(),
            code: "frame_detection".to_string(),
        };
        assert_eq!(event.event_name(), "engine.error");
    }

    #[test]
    fn test_matches_topic() {
        let event = MediaEvent::CaptureStopped {
            kind: CaptureKind::Audio,
        };

        assert!(event.matches_topic("*"));
        assert!(event.matches_topic("capture.*"));
        assert!(event.matches_topic("capture.stopped"));
        assert!(!event.matches_topic("engine.*"));
        assert!(!event.matches_topic("capture.started"));
    }

    #[test]
    fn test_serialization() {
        let event = MediaEvent::CaptureStreamChanged {
            kind: CaptureKind::Video,
            stream_id: Some("3b4c".to_string()),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("capture.stream_changed"));
        assert!(json.contains("3b4c"));

        let deserialized: MediaEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            deserialized,
            MediaEvent::CaptureStreamChanged { .. }
        ));
    }
}
