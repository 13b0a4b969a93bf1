//! Composite media orchestrator
//!
//! The root coordination layer over capture sources and tracking engines.
//! It owns no devices and no models (sources and engines are constructed by
//! a composition layer and injected), but it owns every cross-source rule:
//!
//! - tracking requires an active camera and a ready, bound video surface;
//! - when the camera stops, every tracking engine is stopped with it;
//! - each camera-on cycle gets at most one automatic start attempt per
//!   engine, so transiently unmet preconditions never cause retry storms;
//! - an explicit user stop suppresses automatic restart until an explicit
//!   start or a camera off/on cycle;
//! - capture failures during a start cycle follow a configured policy
//!   (proceed with partial success, or halt and roll back).
//!
//! The auto-start rule is evaluated reactively from capture and binding
//! events, never polled.

pub mod state;

pub use state::{EngineStatus, MediaSnapshot};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureKind, CaptureSource};
use crate::config::{FailurePolicy, OrchestratorConfig};
use crate::engine::{EngineKind, TrackingEngine};
use crate::error::{MediaError, Result};
use crate::events::{EventBus, MediaEvent};
use crate::surface::SurfaceHandle;

/// Per-engine coordination bookkeeping
#[derive(Default)]
struct EngineSlot {
    /// One automatic start attempt has been made since the video dependency
    /// last became available. Cleared when the surface binding is removed,
    /// when video capture stops, or when a fresh global start cycle begins.
    attempted_this_cycle: bool,
    /// The user explicitly stopped this engine; suppresses automatic
    /// restart until an explicit start or a camera off/on cycle.
    user_stopped: bool,
    /// An explicit start request is in flight
    starting: bool,
    last_error: Option<String>,
    /// Surface bound by the external renderer, read by start attempts
    surface: Option<SurfaceHandle>,
}

/// Composite orchestrator over capture sources and tracking engines
pub struct MediaOrchestrator {
    config: OrchestratorConfig,
    video: Arc<CaptureSource>,
    audio: Option<Arc<CaptureSource>>,
    engines: HashMap<EngineKind, Arc<dyn TrackingEngine>>,
    /// Engine evaluation order (injection order)
    order: Vec<EngineKind>,
    slots: RwLock<HashMap<EngineKind, EngineSlot>>,
    events: Arc<EventBus>,
    /// Guards re-entrant global start cycles
    starting: AtomicBool,
    aggregate_error: RwLock<Option<String>>,
    shutdown: CancellationToken,
}

impl MediaOrchestrator {
    /// Create a new orchestrator over injected sources and engines
    ///
    /// The injected instances define the enabled modalities: pass `None` for
    /// `audio` to run camera-only, and only the engines that should exist.
    /// Spawns the event watcher that enforces the camera dependency
    /// reactively.
    pub fn new(
        config: OrchestratorConfig,
        video: Arc<CaptureSource>,
        audio: Option<Arc<CaptureSource>>,
        engines: Vec<Arc<dyn TrackingEngine>>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let order: Vec<EngineKind> = engines.iter().map(|e| e.kind()).collect();
        let slots = order
            .iter()
            .map(|kind| (*kind, EngineSlot::default()))
            .collect();
        let engines = engines.into_iter().map(|e| (e.kind(), e)).collect();

        let orchestrator = Arc::new(Self {
            config,
            video,
            audio,
            engines,
            order,
            slots: RwLock::new(slots),
            events,
            starting: AtomicBool::new(false),
            aggregate_error: RwLock::new(None),
            shutdown: CancellationToken::new(),
        });

        Self::spawn_watcher(&orchestrator);
        orchestrator
    }

    /// Event bus this orchestrator publishes through
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Whether a global start cycle is in progress
    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }

    /// Whether any capture source is active
    pub fn is_media_active(&self) -> bool {
        self.video.is_active()
            || self.audio.as_ref().map(|a| a.is_active()).unwrap_or(false)
    }

    // ========================================================================
    // Global start / stop
    // ========================================================================

    /// Start all configured capture sources, then eligible tracking engines
    ///
    /// Re-entrant calls while a cycle is in progress are no-ops. Microphone
    /// and camera are attempted independently and each failure is recorded
    /// separately; the configured [`FailurePolicy`] decides whether a
    /// capture failure aborts and rolls back the cycle or leaves partial
    /// success running. Tracking engine failures aggregate but never roll
    /// back capture.
    pub async fn start_media(self: &Arc<Self>) -> Result<()> {
        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("start cycle already in progress, ignoring");
            return Ok(());
        }

        info!("media start cycle beginning");
        self.events.publish(MediaEvent::MediaStarting);

        // A full restart is a fresh intention to track: reset all per-engine
        // cycle bookkeeping and error state.
        {
            let mut slots = self.slots.write();
            for slot in slots.values_mut() {
                slot.attempted_this_cycle = false;
                slot.user_stopped = false;
                slot.last_error = None;
            }
        }
        *self.aggregate_error.write() = None;

        let mut failures: Vec<String> = Vec::new();

        if let Some(audio) = &self.audio {
            if !audio.is_active() {
                if let Err(e) = audio.start().await {
                    failures.push(e.to_string());
                }
            }
        }

        if !self.video.is_active() {
            if let Err(e) = self.video.start().await {
                failures.push(e.to_string());
            }
        }

        // Halt policy: any capture failure rolls back every source that did
        // succeed and aborts before tracking engines are considered.
        if self.config.failure_policy == FailurePolicy::Halt && !failures.is_empty() {
            warn!("capture failure under halt policy, rolling back start cycle");
            if let Some(audio) = &self.audio {
                audio.stop();
            }
            self.video.stop();

            let err = MediaError::Aggregate(failures);
            let text = err.to_string();
            *self.aggregate_error.write() = Some(text.clone());
            self.events
                .publish(MediaEvent::MediaSettled { error: Some(text) });
            self.starting.store(false, Ordering::SeqCst);
            return Err(err);
        }

        // Tracking engines: lower severity than capture. Failures are
        // recorded per engine and aggregated, but never roll back capture.
        if self.video.is_active() {
            for kind in self.order.clone() {
                let Some(engine) = self.engines.get(&kind).cloned() else {
                    continue;
                };

                let surface = {
                    let mut slots = self.slots.write();
                    let Some(slot) = slots.get_mut(&kind) else {
                        continue;
                    };
                    if engine.is_tracking() || slot.attempted_this_cycle || slot.starting {
                        continue;
                    }
                    slot.attempted_this_cycle = true;

                    match slot.surface.clone() {
                        Some(surface) => {
                            slot.starting = true;
                            surface
                        }
                        None => {
                            let err = MediaError::PreconditionUnmet(format!(
                                "surface not bound for '{}' engine",
                                kind
                            ));
                            slot.last_error = Some(err.to_string());
                            if self.config.failure_policy == FailurePolicy::Halt {
                                failures.push(err.to_string());
                            }
                            drop(slots);
                            self.publish_engine_error(kind, &err);
                            continue;
                        }
                    }
                };

                let result = self.start_engine(kind, &engine, surface).await;
                let mut slots = self.slots.write();
                if let Some(slot) = slots.get_mut(&kind) {
                    slot.starting = false;
                    if let Err(e) = result {
                        slot.last_error = Some(e.to_string());
                        if self.config.failure_policy == FailurePolicy::Halt {
                            failures.push(e.to_string());
                        }
                    }
                }
            }
        }

        let aggregate = if failures.is_empty() {
            None
        } else {
            Some(MediaError::Aggregate(failures.clone()).to_string())
        };
        *self.aggregate_error.write() = aggregate.clone();
        self.events
            .publish(MediaEvent::MediaSettled { error: aggregate });
        self.starting.store(false, Ordering::SeqCst);

        info!("media start cycle settled");
        if self.config.failure_policy == FailurePolicy::Halt && !failures.is_empty() {
            return Err(MediaError::Aggregate(failures));
        }
        Ok(())
    }

    /// Stop everything. Unconditional and idempotent.
    ///
    /// Stops the microphone, then the camera; stopping the camera also
    /// cascades to every tracking engine (tracking cannot outlive its
    /// camera dependency). Clears all error state.
    pub fn stop_media(&self) {
        info!("stopping all media");

        if let Some(audio) = &self.audio {
            audio.stop();
        }
        self.video.stop();

        // The watcher also reacts to the camera stop; stopping engines here
        // keeps the cascade synchronous with the call.
        for engine in self.engines.values() {
            engine.stop_tracking();
        }

        {
            let mut slots = self.slots.write();
            for slot in slots.values_mut() {
                slot.attempted_this_cycle = false;
                slot.starting = false;
                slot.last_error = None;
            }
        }
        *self.aggregate_error.write() = None;
        self.starting.store(false, Ordering::SeqCst);

        self.events.publish(MediaEvent::MediaStopped);
    }

    /// Stop if any capture is active, otherwise start
    pub async fn toggle_media(self: &Arc<Self>) -> Result<()> {
        if self.is_media_active() {
            self.stop_media();
            Ok(())
        } else {
            self.start_media().await
        }
    }

    // ========================================================================
    // Surface binding
    // ========================================================================

    /// Record the surface the external renderer supplies for an engine
    ///
    /// Binding a surface makes the engine eligible for automatic start (if
    /// the other conditions hold). Clearing it resets that engine's
    /// once-per-cycle bookkeeping, so a re-created surface gets a fresh
    /// automatic attempt.
    pub fn bind_surface(&self, kind: EngineKind, surface: Option<SurfaceHandle>) {
        let bound = surface.is_some();
        {
            let mut slots = self.slots.write();
            let Some(slot) = slots.get_mut(&kind) else {
                warn!("no '{}' engine configured, ignoring surface binding", kind);
                return;
            };
            slot.surface = surface;
            if !bound {
                // Surface teardown ends the cycle for this engine
                slot.attempted_this_cycle = false;
            }
        }

        debug!("surface for '{}' engine {}", kind, if bound { "bound" } else { "cleared" });
        self.events.publish(MediaEvent::SurfaceBound { kind, bound });
    }

    // ========================================================================
    // Explicit per-engine control
    // ========================================================================

    /// Explicitly start one tracking engine
    ///
    /// No-op if already tracking or a start is already in flight. Clears the
    /// engine's user-stopped flag (explicit intent overrides a prior
    /// explicit stop). Fails fast with a distinct message when the engine is
    /// not configured, the camera is not active, or no surface is bound, so
    /// the caller can render a precise hint.
    pub async fn request_engine_start(&self, kind: EngineKind) -> Result<()> {
        let Some(engine) = self.engines.get(&kind).cloned() else {
            let err = MediaError::PreconditionUnmet(format!(
                "no '{}' tracking engine is configured",
                kind
            ));
            self.publish_engine_error(kind, &err);
            return Err(err);
        };

        {
            let mut slots = self.slots.write();
            if let Some(slot) = slots.get_mut(&kind) {
                if engine.is_tracking() || slot.starting {
                    debug!("'{}' engine already tracking or starting, ignoring", kind);
                    return Ok(());
                }
                slot.starting = true;
                slot.user_stopped = false;
            }
        }

        let result = self.checked_engine_start(kind, &engine).await;

        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(&kind) {
            slot.starting = false;
            if let Err(e) = &result {
                slot.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// Explicitly stop one tracking engine
    ///
    /// Sets the user-stopped flag so the dependency watcher does not restart
    /// it while the camera stays on, and resets the once-per-cycle flag so a
    /// later explicit start is a fresh attempt.
    pub fn request_engine_stop(&self, kind: EngineKind) {
        let Some(engine) = self.engines.get(&kind) else {
            warn!("no '{}' engine configured, ignoring stop request", kind);
            return;
        };

        engine.stop_tracking();

        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(&kind) {
            slot.user_stopped = true;
            slot.attempted_this_cycle = false;
            slot.starting = false;
        }
    }

    /// Precondition checks + delegation for an explicit start request
    async fn checked_engine_start(
        &self,
        kind: EngineKind,
        engine: &Arc<dyn TrackingEngine>,
    ) -> Result<()> {
        if !self.video.is_active() {
            let err = MediaError::PreconditionUnmet("camera is not active".to_string());
            self.publish_engine_error(kind, &err);
            return Err(err);
        }

        let surface = self.slots.read().get(&kind).and_then(|s| s.surface.clone());
        let Some(surface) = surface else {
            let err = MediaError::PreconditionUnmet(format!(
                "surface not bound for '{}' engine",
                kind
            ));
            self.publish_engine_error(kind, &err);
            return Err(err);
        };

        self.start_engine(kind, engine, surface).await
    }

    /// Shared start routine: wait for surface metadata, then start tracking
    ///
    /// Detection calls on a surface with unknown dimensions are meaningless,
    /// so the wait comes first; it is bounded by the surface's load/error
    /// events and the configured timeout.
    async fn start_engine(
        &self,
        kind: EngineKind,
        engine: &Arc<dyn TrackingEngine>,
        surface: SurfaceHandle,
    ) -> Result<()> {
        if let Err(e) = surface
            .wait_ready(self.config.surface_ready_timeout())
            .await
        {
            self.publish_engine_error(kind, &e);
            return Err(e);
        }

        engine.start_tracking(surface).await
    }

    fn publish_engine_error(&self, kind: EngineKind, err: &MediaError) {
        self.events.publish(MediaEvent::EngineError {
            kind,
            reason: err.to_string(),
            code: err.code().to_string(),
        });
    }

    // ========================================================================
    // Reactive dependency watcher
    // ========================================================================

    fn spawn_watcher(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut rx = self.events.subscribe();
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => {
                            let Some(this) = weak.upgrade() else { break };
                            this.handle_event(event).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("orchestrator watcher lagged, missed {} events", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            debug!("orchestrator watcher exited");
        });
    }

    async fn handle_event(self: &Arc<Self>, event: MediaEvent) {
        match event {
            // Tracking cannot outlive its camera dependency
            MediaEvent::CaptureStopped {
                kind: CaptureKind::Video,
            }
            | MediaEvent::CaptureStreamChanged {
                kind: CaptureKind::Video,
                stream_id: None,
            } => self.on_video_lost(),

            // New camera stream or fresh surface: re-evaluate auto-start
            MediaEvent::CaptureStarted {
                kind: CaptureKind::Video,
            }
            | MediaEvent::CaptureStreamChanged {
                kind: CaptureKind::Video,
                stream_id: Some(_),
            }
            | MediaEvent::SurfaceBound { bound: true, .. } => {
                self.evaluate_auto_start().await;
            }

            _ => {}
        }
    }

    /// Forced-stop rule: video capture stopped, so stop every tracking
    /// engine and open a fresh cycle for all of them
    fn on_video_lost(&self) {
        for (kind, engine) in &self.engines {
            if engine.is_tracking() {
                info!("camera stopped, stopping '{}' tracking", kind);
                engine.stop_tracking();
            }
        }

        let mut slots = self.slots.write();
        for slot in slots.values_mut() {
            slot.attempted_this_cycle = false;
            // A full camera off/on cycle clears an explicit user stop
            slot.user_stopped = false;
        }
    }

    /// Auto-start watcher condition, evaluated reactively on input changes
    ///
    /// An engine is started automatically when the camera is active with a
    /// live stream, the engine is not already tracking or starting, a
    /// surface is bound, no attempt has been made this cycle, and the user
    /// has not explicitly stopped it. The attempt - success or failure -
    /// consumes this cycle's single automatic try.
    async fn evaluate_auto_start(self: &Arc<Self>) {
        // While a global start cycle runs, its own engine stage owns the
        // start attempts
        if self.is_starting() {
            return;
        }
        if !self.video.is_active() || self.video.stream().is_none() {
            return;
        }

        for kind in self.order.clone() {
            let Some(engine) = self.engines.get(&kind).cloned() else {
                continue;
            };

            let surface = {
                let mut slots = self.slots.write();
                let Some(slot) = slots.get_mut(&kind) else {
                    continue;
                };
                if engine.is_tracking()
                    || slot.starting
                    || slot.attempted_this_cycle
                    || slot.user_stopped
                {
                    continue;
                }
                let Some(surface) = slot.surface.clone() else {
                    continue;
                };
                slot.attempted_this_cycle = true;
                slot.starting = true;
                surface
            };

            debug!("auto-starting '{}' tracking", kind);
            let result = self.start_engine(kind, &engine, surface).await;

            let mut slots = self.slots.write();
            if let Some(slot) = slots.get_mut(&kind) {
                slot.starting = false;
                if let Err(e) = result {
                    warn!("automatic '{}' start failed: {}", kind, e);
                    slot.last_error = Some(e.to_string());
                }
            }
        }
    }

    // ========================================================================
    // State reporting
    // ========================================================================

    /// Snapshot the complete observable state
    pub fn snapshot(&self) -> MediaSnapshot {
        let slots = self.slots.read();
        let engines = self
            .order
            .iter()
            .filter_map(|kind| {
                let engine = self.engines.get(kind)?;
                let slot = slots.get(kind)?;
                Some((
                    *kind,
                    EngineStatus {
                        tracking: engine.is_tracking(),
                        starting: slot.starting,
                        surface_bound: slot.surface.is_some(),
                        user_stopped: slot.user_stopped,
                        last_error: slot.last_error.clone(),
                        last_data: engine.last_data(),
                    },
                ))
            })
            .collect();

        let audio_active = self.audio.as_ref().map(|a| a.is_active()).unwrap_or(false);
        let video_active = self.video.is_active();

        MediaSnapshot {
            audio_active,
            video_active,
            media_active: audio_active || video_active,
            video_stream_id: self.video.stream().map(|s| s.id().to_string()),
            audio_stream_id: self
                .audio
                .as_ref()
                .and_then(|a| a.stream())
                .map(|s| s.id().to_string()),
            video_error: self.video.last_error(),
            audio_error: self.audio.as_ref().and_then(|a| a.last_error()),
            aggregate_error: self.aggregate_error.read().clone(),
            starting: self.is_starting(),
            engines,
        }
    }

    /// Stop all media and shut the watcher down
    pub fn shutdown(&self) {
        self.stop_media();
        self.shutdown.cancel();
    }
}
