//! Playback session controller
//!
//! Owns the playback state machine and the single active session on the
//! surface. Backends report progress through one typed event stream; every
//! event is tagged with the [`SessionId`] it was produced for and
//! [`SessionController::handle_event`] drops anything that does not belong to
//! the active session.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::entities::PlaybackLifecycle;
use crate::domain::errors::{DomainError, Result};
use crate::domain::events::{EventSink, SessionEnvelope, SessionEvent, SessionEvents, SessionId};
use crate::domain::ports::{
    LoadRequest, MetricsReporter, PlayError, PlayOrigin, PlaybackSurface, ProtocolClient,
    SettingsStore, SurfaceCapabilities,
};
use crate::domain::value_objects::{
    validate_volume, ErrorClass, FailureCause, PlaybackFailure, PlaybackState, PlayerSettings,
    ProtocolError, QualityPreference, SettingsPatch, SurfaceGeometry,
};

/// Recoverable warnings kept for diagnostics
const WARNING_HISTORY: usize = 20;

/// Per-session parameters taken from the player settings
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub autoplay: bool,
    pub buffer_seconds: u32,
    pub quality: QualityPreference,
    pub reconnect_attempts: u32,
}

impl SessionOptions {
    pub fn from_settings(settings: &PlayerSettings) -> Result<Self> {
        Ok(Self {
            autoplay: settings.autoplay,
            buffer_seconds: settings.buffer_size,
            quality: settings.quality_preference()?,
            reconnect_attempts: settings.reconnect_attempts,
        })
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autoplay: true,
            buffer_seconds: 30,
            quality: QualityPreference::Auto,
            reconnect_attempts: 3,
        }
    }
}

/// Playback backend chosen for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Protocol client feeding segments into the surface
    Adaptive,
    /// Surface loads the manifest itself
    Native,
    Unsupported,
}

impl BackendKind {
    pub fn select(capabilities: SurfaceCapabilities) -> Self {
        if capabilities.segment_feed {
            Self::Adaptive
        } else if capabilities.native_hls {
            Self::Native
        } else {
            Self::Unsupported
        }
    }
}

enum Backend {
    Adaptive { client: JoinHandle<()> },
    Native,
    Unsupported,
}

impl Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Adaptive { .. } => BackendKind::Adaptive,
            Self::Native => BackendKind::Native,
            Self::Unsupported => BackendKind::Unsupported,
        }
    }
}

struct ActiveSession {
    id: SessionId,
    manifest_url: String,
    backend: Backend,
}

/// Whether an event reached the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Stale,
}

/// Snapshot of the controller for the API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub session: Option<u64>,
    pub backend: Option<BackendKind>,
    pub manifest_url: Option<String>,
    pub last_failure: Option<PlaybackFailure>,
    pub warnings: usize,
    pub load_attempts: u32,
    pub volume: f64,
    pub muted: bool,
    pub geometry: SurfaceGeometry,
}

pub struct SessionController<S: PlaybackSurface> {
    surface: S,
    protocol: Arc<dyn ProtocolClient>,
    settings: Arc<dyn SettingsStore>,
    metrics: Arc<dyn MetricsReporter>,
    options: SessionOptions,
    lifecycle: PlaybackLifecycle,
    generation: u64,
    active: Option<ActiveSession>,
    manifest_url: Option<String>,
    last_failure: Option<PlaybackFailure>,
    warnings: VecDeque<ProtocolError>,
    events_tx: mpsc::UnboundedSender<SessionEnvelope>,
    listener_token: Arc<()>,
}

impl<S: PlaybackSurface> SessionController<S> {
    /// Create an idle controller and the event stream its backends report to
    pub fn new(
        surface: S,
        protocol: Arc<dyn ProtocolClient>,
        settings: Arc<dyn SettingsStore>,
        metrics: Arc<dyn MetricsReporter>,
        options: SessionOptions,
    ) -> (Self, SessionEvents) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let controller = Self {
            surface,
            protocol,
            settings,
            metrics,
            options,
            lifecycle: PlaybackLifecycle::new(),
            generation: 0,
            active: None,
            manifest_url: None,
            last_failure: None,
            warnings: VecDeque::new(),
            events_tx,
            listener_token: Arc::new(()),
        };
        (controller, events_rx)
    }

    pub fn state(&self) -> PlaybackState {
        self.lifecycle.current_state()
    }

    pub fn lifecycle(&self) -> &PlaybackLifecycle {
        &self.lifecycle
    }

    /// Last manifest URL a session was started for
    pub fn manifest_url(&self) -> Option<&str> {
        self.manifest_url.as_deref()
    }

    pub fn last_failure(&self) -> Option<&PlaybackFailure> {
        self.last_failure.as_ref()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ProtocolError> {
        self.warnings.iter()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|session| session.id)
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|session| session.backend.kind())
    }

    /// Event sinks still held by backends, across all sessions
    pub fn live_listeners(&self) -> usize {
        Arc::strong_count(&self.listener_token) - 1
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Takes effect on the next `start`
    pub fn set_options(&mut self, options: SessionOptions) {
        self.options = options;
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            state: self.state(),
            session: self.active_session().map(|id| id.0),
            backend: self.backend(),
            manifest_url: self.manifest_url.clone(),
            last_failure: self.last_failure.clone(),
            warnings: self.warnings.len(),
            load_attempts: self.lifecycle.load_attempts(),
            volume: self.surface.volume(),
            muted: self.surface.is_muted(),
            geometry: self.surface.geometry(),
        }
    }

    /// Begin a new session for `manifest_url`.
    ///
    /// The previous session is released before the new one exists, so events
    /// it still has in flight are discarded as stale.
    pub fn start(&mut self, manifest_url: &str) -> Result<SessionId> {
        self.release_session();
        if self.state().is_attached() {
            self.lifecycle
                .transition_to_idle(Some("superseded by new session".to_string()))?;
        }
        self.lifecycle.transition_to_connecting()?;
        self.report_state();

        self.generation += 1;
        let id = SessionId(self.generation);
        self.manifest_url = Some(manifest_url.to_string());
        self.last_failure = None;
        self.warnings.clear();
        self.metrics.report_session_started();

        let kind = BackendKind::select(self.surface.capabilities());
        tracing::info!(
            session_id = %id,
            manifest_url = %manifest_url,
            backend = ?kind,
            "Starting playback session"
        );

        let backend = match kind {
            BackendKind::Adaptive => {
                self.surface.attach_feed(id, self.options.buffer_seconds);
                let request = LoadRequest {
                    manifest_url: manifest_url.to_string(),
                    quality: self.options.quality,
                    reconnect_attempts: self.options.reconnect_attempts,
                };
                let client = self.protocol.load(request, self.sink(id));
                Backend::Adaptive { client }
            }
            BackendKind::Native => {
                self.surface.attach_source(manifest_url, self.sink(id));
                Backend::Native
            }
            BackendKind::Unsupported => Backend::Unsupported,
        };

        self.active = Some(ActiveSession {
            id,
            manifest_url: manifest_url.to_string(),
            backend,
        });

        if kind == BackendKind::Unsupported {
            self.fail(
                FailureCause::CapabilityMismatch,
                "surface accepts neither fed segments nor native HLS".to_string(),
            );
        }

        Ok(id)
    }

    /// Single entry point for backend events
    pub fn handle_event(&mut self, envelope: SessionEnvelope) -> EventOutcome {
        if self.active_session() != Some(envelope.session) {
            tracing::debug!(
                session_id = %envelope.session,
                active = ?self.active_session(),
                "Discarding stale session event"
            );
            self.metrics.report_stale_event();
            return EventOutcome::Stale;
        }

        match envelope.event {
            SessionEvent::ManifestParsed {
                levels,
                selected_level,
            } => self.on_manifest_parsed(levels, selected_level),
            SessionEvent::FragmentLoaded {
                sequence,
                duration,
                data,
            } => {
                self.metrics.report_fragment(data.len());
                self.surface.append_segment(sequence, duration, data);
            }
            SessionEvent::Error(error) => self.on_protocol_error(error),
            SessionEvent::EndOfStream => {
                tracing::info!(session_id = %envelope.session, "Stream ended");
            }
        }

        EventOutcome::Applied
    }

    /// Restart the last manifest URL after a fatal failure
    pub fn retry(&mut self) -> Result<SessionId> {
        let state = self.state();
        if !state.is_errored() {
            return Err(DomainError::InvalidTransition {
                state,
                action: "retry",
            });
        }
        let manifest_url = self
            .manifest_url
            .clone()
            .ok_or(DomainError::InvalidTransition {
                state,
                action: "retry without a manifest",
            })?;

        tracing::info!(manifest_url = %manifest_url, "Retrying playback");
        self.start(&manifest_url)
    }

    pub fn toggle_play(&mut self) -> Result<PlaybackState> {
        match self.state() {
            PlaybackState::Playing => {
                self.surface.pause();
                self.lifecycle.transition_to_paused()?;
            }
            PlaybackState::Ready | PlaybackState::Paused => {
                self.surface
                    .play(PlayOrigin::User)
                    .map_err(|e| DomainError::PlaybackRejected(e.to_string()))?;
                self.lifecycle.transition_to_playing()?;
            }
            state => {
                return Err(match (&self.last_failure, state) {
                    (Some(failure), PlaybackState::Errored) => failure.to_domain_error(),
                    _ => DomainError::InvalidTransition {
                        state,
                        action: "toggle playback",
                    },
                })
            }
        }

        self.report_state();
        Ok(self.state())
    }

    /// Returns the new mute flag
    pub fn toggle_mute(&mut self) -> bool {
        let muted = !self.surface.is_muted();
        self.surface.set_muted(muted);
        tracing::debug!(muted, "Mute toggled");
        muted
    }

    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        validate_volume(volume)?;
        self.surface.set_volume(volume);
        self.persist_volume(volume);
        Ok(())
    }

    /// Apply a volume read from the settings document without writing it back
    pub fn restore_volume(&mut self, volume: f64) -> Result<()> {
        validate_volume(volume)?;
        self.surface.set_volume(volume);
        Ok(())
    }

    pub fn request_fullscreen(&mut self) -> Result<SurfaceGeometry> {
        self.surface.request_fullscreen()
    }

    /// Release the session and return to Idle
    pub fn cleanup(&mut self) {
        let released = self.release_session();
        if self.state() != PlaybackState::Idle {
            if let Err(e) = self
                .lifecycle
                .transition_to_idle(Some("cleanup".to_string()))
            {
                tracing::error!(error = %e, "Failed to reset playback state");
            }
            self.report_state();
        }
        if released {
            tracing::info!("Playback session cleaned up");
        }
    }

    /// The locator could not be resolved; nothing is started
    pub fn fail_resolution(&mut self, locator: &str, error: &DomainError) {
        self.cleanup();
        self.manifest_url = None;
        tracing::warn!(locator = %locator, error = %error, "Source locator rejected");
        self.metrics.report_fatal_error(FailureCause::Resolution);
        self.last_failure = Some(PlaybackFailure::new(
            FailureCause::Resolution,
            error.to_string(),
            locator,
        ));
    }

    fn on_manifest_parsed(&mut self, levels: usize, selected_level: usize) {
        if self.state() != PlaybackState::Connecting {
            tracing::debug!(state = %self.state(), "Ignoring repeated manifest announcement");
            return;
        }

        if let Err(e) = self.lifecycle.transition_to_ready() {
            tracing::error!(error = %e, "Manifest parsed in unexpected state");
            return;
        }
        self.report_state();
        tracing::info!(levels, selected_level, "Manifest parsed");

        if !self.options.autoplay {
            return;
        }

        match self.surface.play(PlayOrigin::Autoplay) {
            Ok(()) => {
                if let Err(e) = self.lifecycle.transition_to_playing() {
                    tracing::error!(error = %e, "Failed to enter playing state");
                    return;
                }
                self.report_state();
            }
            Err(PlayError::AutoplayBlocked) => {
                tracing::info!("Autoplay blocked by surface, waiting for user");
            }
            Err(PlayError::Failed(reason)) => {
                tracing::warn!(reason = %reason, "Autoplay failed");
            }
        }
    }

    fn on_protocol_error(&mut self, error: ProtocolError) {
        match error.classify() {
            ErrorClass::Recoverable => {
                tracing::warn!(
                    kind = ?error.kind,
                    details = %error.details,
                    "Recoverable protocol error"
                );
                self.metrics.report_recoverable_warning();
                if self.warnings.len() >= WARNING_HISTORY {
                    self.warnings.pop_front();
                }
                self.warnings.push_back(error);
            }
            ErrorClass::Fatal(cause) => self.fail(cause, error.details),
        }
    }

    fn fail(&mut self, cause: FailureCause, details: String) {
        let manifest_url = self
            .active
            .as_ref()
            .map(|session| session.manifest_url.clone())
            .or_else(|| self.manifest_url.clone())
            .unwrap_or_default();
        let failure = PlaybackFailure::new(cause, details, manifest_url);

        tracing::error!(
            cause = ?cause,
            manifest_url = %failure.manifest_url,
            "{}",
            failure.message()
        );

        self.release_session();
        if let Err(e) = self.lifecycle.transition_to_errored(failure.message()) {
            tracing::error!(error = %e, "Failed to enter errored state");
        }
        self.report_state();
        self.metrics.report_fatal_error(cause);
        self.last_failure = Some(failure);
    }

    fn sink(&self, id: SessionId) -> EventSink {
        EventSink::new(id, self.events_tx.clone(), self.listener_token.clone())
    }

    /// Abort the active backend and detach it from the surface
    fn release_session(&mut self) -> bool {
        let Some(session) = self.active.take() else {
            return false;
        };

        match session.backend {
            Backend::Adaptive { client } => {
                client.abort();
                self.surface.detach();
            }
            Backend::Native => self.surface.detach(),
            Backend::Unsupported => {}
        }

        tracing::debug!(session_id = %session.id, "Session released");
        true
    }

    fn persist_volume(&self, volume: f64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(volume, "No runtime, volume not persisted");
            return;
        };

        let store = self.settings.clone();
        runtime.spawn(async move {
            if let Err(e) = store.set(SettingsPatch::volume(volume)).await {
                tracing::warn!(error = %e, volume, "Failed to persist volume");
            }
        });
    }

    fn report_state(&self) {
        self.metrics.report_state_change(self.state());
    }
}

impl<S: PlaybackSurface> Drop for SessionController<S> {
    fn drop(&mut self) {
        self.release_session();
    }
}
