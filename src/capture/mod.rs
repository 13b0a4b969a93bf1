//! Capture sources
//!
//! A capture source owns one physical input stream (camera or microphone).
//! The platform capture API itself (device enumeration, permission prompts,
//! constraint negotiation) lives behind the [`CaptureBackend`] trait; this
//! module owns the lifecycle around it: start/stop sequencing, exclusive
//! stream ownership, and event publication.

pub mod source;

pub use source::CaptureSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// Capture modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Video,
    Audio,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Video => "video",
            CaptureKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a live media stream
///
/// Owned exclusively by the [`CaptureSource`] that acquired it; clones are
/// cheap references handed out for observation. All teardown flows through
/// the owning source, which marks the handle released exactly once.
#[derive(Clone)]
pub struct StreamHandle {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    id: Uuid,
    kind: CaptureKind,
    track_count: u32,
    released: AtomicBool,
}

impl StreamHandle {
    /// Create a new live stream handle
    pub fn new(kind: CaptureKind, track_count: u32) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4(),
                kind,
                track_count,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Unique stream identifier
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> CaptureKind {
        self.inner.kind
    }

    /// Number of underlying media tracks
    pub fn track_count(&self) -> u32 {
        self.inner.track_count
    }

    /// Whether the owning source has released this stream
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Mark the stream released (all tracks stopped). Idempotent.
    pub fn release(&self) {
        self.inner.released.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("track_count", &self.inner.track_count)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Platform capture backend
///
/// The seam between the coordination layer and the platform capture API.
/// `acquire` may prompt the user for permission and therefore suspend for an
/// unbounded duration; callers guard against concurrent invocation. All
/// acquisition failures (no device, permission denied, constraints) are
/// reported through the same error channel, distinguished by message text
/// and error code.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Which modality this backend captures
    fn kind(&self) -> CaptureKind;

    /// Request the underlying device and return a live stream handle
    async fn acquire(&self) -> Result<StreamHandle>;

    /// Stop all tracks of a previously acquired stream
    fn release(&self, stream: &StreamHandle) {
        stream.release();
    }
}
