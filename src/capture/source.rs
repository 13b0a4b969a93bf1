//! Capture source lifecycle
//!
//! Wraps a [`CaptureBackend`] with the start/stop state machine: exclusive
//! stream ownership, idempotent transitions, and event publication. The
//! stream field is non-empty if and only if the source is active; both are
//! updated under the same lock so observers never see them disagree.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{CaptureBackend, CaptureKind, StreamHandle};
use crate::error::{MediaError, Result};
use crate::events::{EventBus, MediaEvent};

/// A capture source owning one physical media stream
///
/// Two instances typically exist per orchestrator: one video (camera) and
/// one audio (microphone). The source publishes `capture.*` events on every
/// lifecycle transition so the orchestrator and UI can react without
/// polling.
pub struct CaptureSource {
    kind: CaptureKind,
    backend: Box<dyn CaptureBackend>,
    events: Arc<EventBus>,
    stream: RwLock<Option<StreamHandle>>,
    /// Guards against overlapping acquisition calls; a permission prompt can
    /// keep `start` suspended for an unbounded time.
    starting: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl CaptureSource {
    /// Create a new capture source over the given backend
    pub fn new(backend: Box<dyn CaptureBackend>, events: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            kind: backend.kind(),
            backend,
            events,
            stream: RwLock::new(None),
            starting: AtomicBool::new(false),
            last_error: RwLock::new(None),
        })
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    /// Whether a live stream is currently held
    pub fn is_active(&self) -> bool {
        self.stream.read().is_some()
    }

    /// Current stream handle, if active
    pub fn stream(&self) -> Option<StreamHandle> {
        self.stream.read().clone()
    }

    /// Most recent acquisition failure, cleared on successful start
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Acquire the underlying device and transition to active
    ///
    /// No-op if already active (no duplicate device call). May suspend for a
    /// platform permission prompt. On failure the source stays inactive, the
    /// error is recorded and published, and the caller receives it.
    pub async fn start(&self) -> Result<()> {
        if self.is_active() {
            debug!("{} capture already active, start is a no-op", self.kind);
            return Ok(());
        }

        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("{} capture start already in flight, ignoring", self.kind);
            return Ok(());
        }

        *self.last_error.write() = None;

        let result = self.backend.acquire().await;
        self.starting.store(false, Ordering::SeqCst);

        match result {
            Ok(stream) => {
                let stream_id = stream.id().to_string();
                *self.stream.write() = Some(stream);

                self.events.publish(MediaEvent::CaptureStreamChanged {
                    kind: self.kind,
                    stream_id: Some(stream_id),
                });
                self.events
                    .publish(MediaEvent::CaptureStarted { kind: self.kind });

                info!("{} capture started", self.kind);
                Ok(())
            }
            Err(e) => {
                let code = e.code().to_string();
                // A backend error that is already typed carries a bare
                // reason; wrapping its Display again would nest the prefix.
                let reason = match e {
                    MediaError::CaptureUnavailable { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!("{} capture failed to start: {}", self.kind, reason);
                *self.last_error.write() = Some(reason.clone());

                self.events.publish(MediaEvent::CaptureError {
                    kind: self.kind,
                    reason: reason.clone(),
                    code,
                });

                Err(MediaError::CaptureUnavailable {
                    kind: self.kind,
                    reason,
                })
            }
        }
    }

    /// Release the device and transition to inactive. Idempotent.
    pub fn stop(&self) {
        let taken = self.stream.write().take();
        let Some(stream) = taken else {
            debug!("{} capture already stopped, stop is a no-op", self.kind);
            return;
        };

        // All teardown flows through the owning source
        self.backend.release(&stream);

        self.events.publish(MediaEvent::CaptureStreamChanged {
            kind: self.kind,
            stream_id: None,
        });
        self.events
            .publish(MediaEvent::CaptureStopped { kind: self.kind });

        info!("{} capture stopped", self.kind);
    }
}
