use thiserror::Error;

use crate::capture::CaptureKind;
use crate::engine::EngineKind;

/// Application-wide error type
///
/// Every failure that crosses a component boundary is expressed as one of
/// these variants. Errors carry a human-readable message plus a stable
/// machine-readable code (see [`MediaError::code`]) used in error events.
#[derive(Error, Debug)]
pub enum MediaError {
    /// Device enumeration or acquisition failed (permission denied, no
    /// device, constraint not satisfiable). Non-fatal to the rest of the
    /// system; recorded per-source.
    #[error("Capture unavailable [{kind}]: {reason}")]
    CaptureUnavailable { kind: CaptureKind, reason: String },

    /// A tracking start was requested before the engine's detection model
    /// finished asynchronous initialization. Reported, never retried
    /// automatically.
    #[error("Tracking engine not ready [{kind}]: detection model is still loading")]
    EngineNotReady { kind: EngineKind },

    /// Tracking start requested without an active camera, a bound surface,
    /// or a configured engine. The reason string distinguishes which.
    #[error("Precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// A single frame's inference call failed. Surfaced through the error
    /// channel; the frame loop continues.
    #[error("Frame detection failed [{kind}]: {reason}")]
    FrameDetection { kind: EngineKind, reason: String },

    /// The video surface never reached a usable state (load failure or
    /// readiness timeout) while an engine start was waiting on it.
    #[error("Surface not ready: {0}")]
    SurfaceNotReady(String),

    /// Multiple independent sub-failures from one start cycle.
    #[error("{}", .0.join("; "))]
    Aggregate(Vec<String>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Stable error code for programmatic handling in error events
    pub fn code(&self) -> &'static str {
        match self {
            Self::CaptureUnavailable { .. } => "capture_unavailable",
            Self::EngineNotReady { .. } => "engine_not_ready",
            Self::PreconditionUnmet(_) => "precondition_unmet",
            Self::FrameDetection { .. } => "frame_detection",
            Self::SurfaceNotReady(_) => "surface_not_ready",
            Self::Aggregate(_) => "aggregate",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, MediaError>;
