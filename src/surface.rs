//! Video surface binding
//!
//! A [`SurfaceHandle`] is an opaque reference to the renderable video element
//! that tracking engines read frames from. The external renderer owns the
//! element and drives the handle's state (metadata loaded, load failure,
//! paused/ended); the orchestrator and engines only read it. Single writer,
//! multiple readers.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{MediaError, Result};

/// Load state of the underlying video element
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceStatus {
    /// Metadata (dimensions) not yet known
    Loading,
    /// Metadata loaded, frames can be read
    Ready { width: u32, height: u32 },
    /// The element failed to load
    Failed(String),
}

/// Cheap-clone handle to a renderable video surface
#[derive(Clone)]
pub struct SurfaceHandle {
    inner: Arc<SurfaceInner>,
}

struct SurfaceInner {
    label: String,
    status_tx: watch::Sender<SurfaceStatus>,
    // Kept so the watch channel stays open with zero external subscribers
    _status_rx: Mutex<watch::Receiver<SurfaceStatus>>,
    paused: AtomicBool,
    ended: AtomicBool,
}

impl SurfaceHandle {
    /// Create a new surface handle in the `Loading` state
    pub fn new(label: impl Into<String>) -> Self {
        let (status_tx, status_rx) = watch::channel(SurfaceStatus::Loading);
        Self {
            inner: Arc::new(SurfaceInner {
                label: label.into(),
                status_tx,
                _status_rx: Mutex::new(status_rx),
                paused: AtomicBool::new(false),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// Renderer-assigned label, for diagnostics
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Current load status
    pub fn status(&self) -> SurfaceStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Mark metadata loaded with known dimensions (renderer-side)
    pub fn mark_ready(&self, width: u32, height: u32) {
        let _ = self.inner.status_tx.send(SurfaceStatus::Ready { width, height });
    }

    /// Mark the element failed to load (renderer-side)
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let _ = self
            .inner
            .status_tx
            .send(SurfaceStatus::Failed(reason.into()));
    }

    /// Set whether playback is paused (renderer-side)
    pub fn set_paused(&self, paused: bool) {
        self.inner.paused.store(paused, Ordering::SeqCst);
    }

    /// Set whether playback has ended (renderer-side)
    pub fn set_ended(&self, ended: bool) {
        self.inner.ended.store(ended, Ordering::SeqCst);
    }

    /// Whether a detection call on this surface is meaningful right now
    ///
    /// Requires loaded metadata and active playback. Detection loops skip
    /// frames while this is false rather than terminating, so recovery is
    /// automatic once the surface becomes ready again.
    pub fn is_ready(&self) -> bool {
        matches!(self.status(), SurfaceStatus::Ready { .. })
            && !self.inner.paused.load(Ordering::SeqCst)
            && !self.inner.ended.load(Ordering::SeqCst)
    }

    /// Wait until metadata is loaded, bounded by load/error events and the
    /// given timeout
    ///
    /// Detection on a surface with unknown dimensions is meaningless, so
    /// engine starts wait here first. Returns the dimensions on success.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(u32, u32)> {
        let mut rx = self.inner.status_tx.subscribe();

        let wait = async {
            loop {
                match rx.borrow_and_update().clone() {
                    SurfaceStatus::Ready { width, height } => return Ok((width, height)),
                    SurfaceStatus::Failed(reason) => {
                        return Err(MediaError::SurfaceNotReady(format!(
                            "surface '{}' failed to load: {}",
                            self.inner.label, reason
                        )))
                    }
                    SurfaceStatus::Loading => {}
                }
                if rx.changed().await.is_err() {
                    return Err(MediaError::SurfaceNotReady(format!(
                        "surface '{}' was dropped while loading",
                        self.inner.label
                    )));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(MediaError::SurfaceNotReady(format!(
                "surface '{}' metadata not loaded within {:?}",
                self.inner.label, timeout
            ))),
        }
    }
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("label", &self.inner.label)
            .field("status", &self.status())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_while_loading() {
        let surface = SurfaceHandle::new("preview");
        assert_eq!(surface.status(), SurfaceStatus::Loading);
        assert!(!surface.is_ready());
    }

    #[test]
    fn test_ready_after_metadata() {
        let surface = SurfaceHandle::new("preview");
        surface.mark_ready(640, 480);
        assert!(surface.is_ready());
        assert_eq!(
            surface.status(),
            SurfaceStatus::Ready {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_paused_or_ended_suppresses_ready() {
        let surface = SurfaceHandle::new("preview");
        surface.mark_ready(640, 480);

        surface.set_paused(true);
        assert!(!surface.is_ready());
        surface.set_paused(false);
        assert!(surface.is_ready());

        surface.set_ended(true);
        assert!(!surface.is_ready());
    }

    #[tokio::test]
    async fn test_wait_ready_resolves_on_metadata() {
        let surface = SurfaceHandle::new("preview");
        let waiter = surface.clone();

        let handle =
            tokio::spawn(async move { waiter.wait_ready(Duration::from_secs(1)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        surface.mark_ready(1280, 720);

        let dims = handle.await.unwrap().unwrap();
        assert_eq!(dims, (1280, 720));
    }

    #[tokio::test]
    async fn test_wait_ready_fails_on_load_error() {
        let surface = SurfaceHandle::new("preview");
        let waiter = surface.clone();

        let handle =
            tokio::spawn(async move { waiter.wait_ready(Duration::from_secs(1)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        surface.mark_failed("decode error");

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, MediaError::SurfaceNotReady(_)));
        assert!(err.to_string().contains("decode error"));
    }

    #[tokio::test]
    async fn test_wait_ready_times_out() {
        tokio::time::pause();
        let surface = SurfaceHandle::new("preview");

        let result = surface.wait_ready(Duration::from_millis(100)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, MediaError::SurfaceNotReady(_)));
    }
}
