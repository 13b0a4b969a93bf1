//! Shared landmark tracking engine
//!
//! One implementation serves hands, body and face alike: initialize is the
//! detector's concern, the engine runs the per-frame loop and publishes
//! results. The loop is a cooperative task that reschedules itself through
//! the injected [`FrameScheduler`] and checks its run flag at the top of
//! every iteration, so `stop_tracking` takes effect on the next frame
//! boundary without any join.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{DetectionResult, Detector, EngineKind, FrameScheduler, TrackingEngine};
use crate::error::{MediaError, Result};
use crate::events::{EventBus, MediaEvent};
use crate::surface::SurfaceHandle;
use crate::utils::LogThrottler;
use crate::warn_throttled;
use async_trait::async_trait;

/// Landmark tracking engine over a pluggable detector
///
/// Construct one per enabled modality:
///
/// ```ignore
/// let hands = LandmarkEngine::new(detector, scheduler, events.clone());
/// ```
pub struct LandmarkEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    kind: EngineKind,
    detector: Arc<dyn Detector>,
    scheduler: Arc<dyn FrameScheduler>,
    events: Arc<EventBus>,
    tracking: AtomicBool,
    last_data: RwLock<Option<DetectionResult>>,
    /// Surface bound for the duration of the current tracking session only
    surface: RwLock<Option<SurfaceHandle>>,
    cancel: Mutex<Option<CancellationToken>>,
    had_detection: AtomicBool,
    first_detection: Notify,
    throttler: LogThrottler,
}

impl LandmarkEngine {
    /// Create a new engine for the detector's modality
    pub fn new(
        detector: Arc<dyn Detector>,
        scheduler: Arc<dyn FrameScheduler>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(EngineInner {
                kind: detector.kind(),
                detector,
                scheduler,
                events,
                tracking: AtomicBool::new(false),
                last_data: RwLock::new(None),
                surface: RwLock::new(None),
                cancel: Mutex::new(None),
                had_detection: AtomicBool::new(false),
                first_detection: Notify::new(),
                throttler: LogThrottler::default(),
            }),
        })
    }
}

impl EngineInner {
    /// Per-frame loop: one detection per scheduled frame, skipped while the
    /// surface is not ready, continuing through per-frame failures
    async fn frame_loop(self: Arc<Self>, token: CancellationToken) {
        debug!("{} frame loop started", self.kind);

        loop {
            if !self.tracking.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.scheduler.next_frame() => {}
            }

            if !self.tracking.load(Ordering::SeqCst) {
                break;
            }

            // Surface can become invalid externally (camera stopped, element
            // paused). Keep polling rather than terminating, so recovery is
            // automatic once it is ready again.
            let surface = match self.surface.read().clone() {
                Some(s) if s.is_ready() => s,
                _ => continue,
            };

            match self.detector.detect(&surface).await {
                Ok(result) => {
                    *self.last_data.write() = Some(result.clone());

                    if result.has_detection()
                        && !self.had_detection.swap(true, Ordering::SeqCst)
                    {
                        debug!("{} first detection of this session", self.kind);
                        self.first_detection.notify_waiters();
                        self.events
                            .publish(MediaEvent::EngineFirstDetection { kind: self.kind });
                    }

                    self.events.publish(MediaEvent::EngineData {
                        kind: self.kind,
                        result,
                    });
                }
                Err(e) => {
                    // Transient per-frame failures are never fatal
                    let reason = e.to_string();
                    warn_throttled!(
                        self.throttler,
                        "frame_detection",
                        "{} frame detection failed: {}",
                        self.kind,
                        reason
                    );
                    self.events.publish(MediaEvent::EngineError {
                        kind: self.kind,
                        reason,
                        code: "frame_detection".to_string(),
                    });
                }
            }
        }

        debug!("{} frame loop exited", self.kind);
    }
}

#[async_trait]
impl TrackingEngine for LandmarkEngine {
    fn kind(&self) -> EngineKind {
        self.inner.kind
    }

    fn is_tracking(&self) -> bool {
        self.inner.tracking.load(Ordering::SeqCst)
    }

    fn last_data(&self) -> Option<DetectionResult> {
        self.inner.last_data.read().clone()
    }

    async fn start_tracking(&self, surface: SurfaceHandle) -> Result<()> {
        let inner = &self.inner;

        if !inner.detector.is_initialized() {
            let err = MediaError::EngineNotReady { kind: inner.kind };
            inner.events.publish(MediaEvent::EngineError {
                kind: inner.kind,
                reason: err.to_string(),
                code: err.code().to_string(),
            });
            return Err(err);
        }

        if inner.tracking.swap(true, Ordering::SeqCst) {
            debug!("{} already tracking, start is a no-op", inner.kind);
            return Ok(());
        }

        *inner.surface.write() = Some(surface);
        inner.had_detection.store(false, Ordering::SeqCst);
        inner.throttler.clear_all();

        let token = CancellationToken::new();
        *inner.cancel.lock() = Some(token.clone());

        inner
            .events
            .publish(MediaEvent::EngineStarted { kind: inner.kind });
        info!("{} tracking started", inner.kind);

        tokio::spawn(inner.clone().frame_loop(token));
        Ok(())
    }

    fn stop_tracking(&self) {
        let inner = &self.inner;

        if !inner.tracking.swap(false, Ordering::SeqCst) {
            debug!("{} not tracking, stop is a no-op", inner.kind);
            return;
        }

        if let Some(token) = inner.cancel.lock().take() {
            token.cancel();
        }
        *inner.last_data.write() = None;
        *inner.surface.write() = None;

        inner
            .events
            .publish(MediaEvent::EngineStopped { kind: inner.kind });
        info!("{} tracking stopped", inner.kind);
    }

    async fn first_detection(&self) {
        // Register with the notifier before checking the flag:
        // notify_waiters only wakes already-registered waiters, so checking
        // first would miss a detection landing in between.
        let notified = self.inner.first_detection.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.inner.had_detection.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Landmark, LandmarkSet, ManualScheduler};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct MockDetector {
        kind: EngineKind,
        initialized: AtomicBool,
        fail: AtomicBool,
        /// Return an empty (no subject) result instead of a detection
        empty: AtomicBool,
        detect_calls: AtomicU32,
    }

    impl MockDetector {
        fn ready(kind: EngineKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                initialized: AtomicBool::new(true),
                fail: AtomicBool::new(false),
                empty: AtomicBool::new(false),
                detect_calls: AtomicU32::new(0),
            })
        }

        fn sample_result(kind: EngineKind) -> DetectionResult {
            DetectionResult {
                kind,
                landmark_sets: vec![LandmarkSet {
                    label: Some("Right".to_string()),
                    score: 0.93,
                    points: vec![Landmark {
                        x: 0.5,
                        y: 0.5,
                        z: 0.0,
                    }],
                }],
                classifications: vec![],
                timestamp: chrono::Utc::now(),
            }
        }
    }

    #[async_trait]
    impl Detector for MockDetector {
        fn kind(&self) -> EngineKind {
            self.kind
        }

        fn is_initialized(&self) -> bool {
            self.initialized.load(Ordering::SeqCst)
        }

        async fn detect(&self, _surface: &SurfaceHandle) -> Result<DetectionResult> {
            self.detect_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(MediaError::FrameDetection {
                    kind: self.kind,
                    reason: "inference failed".to_string(),
                });
            }
            if self.empty.load(Ordering::SeqCst) {
                return Ok(DetectionResult::empty(self.kind));
            }
            Ok(Self::sample_result(self.kind))
        }
    }

    struct Rig {
        engine: Arc<LandmarkEngine>,
        detector: Arc<MockDetector>,
        scheduler: Arc<ManualScheduler>,
        events: Arc<EventBus>,
    }

    fn rig(kind: EngineKind) -> Rig {
        let detector = MockDetector::ready(kind);
        let scheduler = Arc::new(ManualScheduler::new());
        let events = Arc::new(EventBus::new());
        let engine = LandmarkEngine::new(detector.clone(), scheduler.clone(), events.clone());
        Rig {
            engine,
            detector,
            scheduler,
            events,
        }
    }

    fn ready_surface() -> SurfaceHandle {
        let surface = SurfaceHandle::new("test");
        surface.mark_ready(640, 480);
        surface
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_start_requires_initialized_model() {
        let r = rig(EngineKind::Hands);
        r.detector.initialized.store(false, Ordering::SeqCst);

        let err = r.engine.start_tracking(ready_surface()).await.unwrap_err();
        assert!(matches!(err, MediaError::EngineNotReady { .. }));
        assert!(!r.engine.is_tracking());
    }

    #[tokio::test]
    async fn test_start_idempotent_while_tracking() {
        let r = rig(EngineKind::Hands);

        r.engine.start_tracking(ready_surface()).await.unwrap();
        assert!(r.engine.is_tracking());

        // Second start is a no-op success
        r.engine.start_tracking(ready_surface()).await.unwrap();
        assert!(r.engine.is_tracking());

        r.engine.stop_tracking();
    }

    #[tokio::test]
    async fn test_detects_once_per_frame() {
        let r = rig(EngineKind::Hands);
        r.engine.start_tracking(ready_surface()).await.unwrap();

        r.scheduler.tick();
        settle().await;
        assert_eq!(r.detector.detect_calls.load(Ordering::SeqCst), 1);
        assert!(r.engine.last_data().is_some());

        r.scheduler.tick();
        settle().await;
        assert_eq!(r.detector.detect_calls.load(Ordering::SeqCst), 2);

        r.engine.stop_tracking();
    }

    #[tokio::test]
    async fn test_skips_frames_while_surface_not_ready() {
        let r = rig(EngineKind::Body);
        let surface = ready_surface();
        r.engine.start_tracking(surface.clone()).await.unwrap();

        surface.set_paused(true);
        r.scheduler.tick();
        settle().await;
        assert_eq!(r.detector.detect_calls.load(Ordering::SeqCst), 0);

        // Loop keeps polling; recovery is automatic
        surface.set_paused(false);
        r.scheduler.tick();
        settle().await;
        assert_eq!(r.detector.detect_calls.load(Ordering::SeqCst), 1);

        r.engine.stop_tracking();
    }

    #[tokio::test]
    async fn test_frame_failure_does_not_stop_loop() {
        let r = rig(EngineKind::Face);
        let mut rx = r.events.subscribe();
        r.engine.start_tracking(ready_surface()).await.unwrap();

        r.detector.fail.store(true, Ordering::SeqCst);
        r.scheduler.tick();
        settle().await;

        assert!(r.engine.is_tracking());

        r.detector.fail.store(false, Ordering::SeqCst);
        r.scheduler.tick();
        settle().await;
        assert_eq!(r.detector.detect_calls.load(Ordering::SeqCst), 2);
        assert!(r.engine.last_data().is_some());

        // engine.started, then the per-frame error, then data
        let mut saw_frame_error = false;
        let mut saw_data = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                MediaEvent::EngineError { code, .. } if code == "frame_detection" => {
                    saw_frame_error = true
                }
                MediaEvent::EngineData { .. } => saw_data = true,
                _ => {}
            }
        }
        assert!(saw_frame_error);
        assert!(saw_data);

        r.engine.stop_tracking();
    }

    #[tokio::test]
    async fn test_stop_clears_session_state() {
        let r = rig(EngineKind::Hands);
        r.engine.start_tracking(ready_surface()).await.unwrap();

        r.scheduler.tick();
        settle().await;
        assert!(r.engine.last_data().is_some());

        r.engine.stop_tracking();
        assert!(!r.engine.is_tracking());
        assert!(r.engine.last_data().is_none());

        // No further detections after stop
        let calls = r.detector.detect_calls.load(Ordering::SeqCst);
        r.scheduler.tick();
        settle().await;
        assert_eq!(r.detector.detect_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_stop_idempotent() {
        let r = rig(EngineKind::Hands);
        r.engine.start_tracking(ready_surface()).await.unwrap();

        r.engine.stop_tracking();
        r.engine.stop_tracking();
        assert!(!r.engine.is_tracking());
    }

    #[tokio::test]
    async fn test_first_detection_fires_once_per_session() {
        let r = rig(EngineKind::Hands);
        let mut rx = r.events.subscribe();

        // Nothing in frame at first
        r.detector.empty.store(true, Ordering::SeqCst);
        r.engine.start_tracking(ready_surface()).await.unwrap();

        let engine = r.engine.clone();
        let waiter = tokio::spawn(async move { engine.first_detection().await });

        r.scheduler.tick();
        settle().await;
        assert!(!waiter.is_finished());

        // Subject enters the frame
        r.detector.empty.store(false, Ordering::SeqCst);
        r.scheduler.tick();
        settle().await;
        waiter.await.unwrap();

        // A later detection does not fire the one-shot again
        r.scheduler.tick();
        settle().await;

        let count = {
            let mut count = 0;
            while let Ok(ev) = rx.try_recv() {
                if matches!(ev, MediaEvent::EngineFirstDetection { .. }) {
                    count += 1;
                }
            }
            count
        };
        assert_eq!(count, 1);

        // Immediate resolution once a detection happened
        r.engine.first_detection().await;

        r.engine.stop_tracking();
    }

    #[tokio::test]
    async fn test_first_detection_not_missed_when_racing_a_frame() {
        // A waiter that registers while the first detecting frame is being
        // processed must still resolve; the notifier fires only once per
        // session, so a missed wakeup would block forever.
        for _ in 0..20 {
            let r = rig(EngineKind::Hands);
            r.engine.start_tracking(ready_surface()).await.unwrap();

            let engine = r.engine.clone();
            let waiter = tokio::spawn(async move { engine.first_detection().await });
            r.scheduler.tick();

            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("first_detection waiter must resolve")
                .unwrap();

            r.engine.stop_tracking();
        }
    }
}
