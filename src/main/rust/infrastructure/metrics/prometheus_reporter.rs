use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{FailureCause, PlaybackState};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref PLAYBACK_STATE: IntGauge = IntGauge::new(
        "player_playback_state",
        "Current playback state (0=idle, 1=connecting, 2=ready, 3=playing, 4=paused, 5=errored)"
    ).expect("metric can be created");
    pub static ref SESSIONS_STARTED: IntCounter = IntCounter::new(
        "player_sessions_started_total",
        "Total number of playback sessions started"
    ).expect("metric can be created");
    pub static ref FATAL_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("player_fatal_errors_total", "Fatal playback failures by cause"),
        &["cause"]
    ).expect("metric can be created");
    pub static ref RECOVERABLE_WARNINGS: IntCounter = IntCounter::new(
        "player_recoverable_warnings_total",
        "Non-fatal protocol errors reported by backends"
    ).expect("metric can be created");
    pub static ref STALE_EVENTS: IntCounter = IntCounter::new(
        "player_stale_events_total",
        "Events discarded because their session was no longer active"
    ).expect("metric can be created");
    pub static ref FRAGMENTS_LOADED: IntCounter = IntCounter::new(
        "player_fragments_loaded_total",
        "Media fragments fed to the surface"
    ).expect("metric can be created");
    pub static ref BYTES_LOADED: IntCounter = IntCounter::new(
        "player_bytes_loaded_total",
        "Total media bytes fed to the surface"
    ).expect("metric can be created");
    pub static ref RENDERED_OVERLAYS: IntGauge = IntGauge::new(
        "compositor_rendered_overlays",
        "Overlays in the current composed frame"
    ).expect("metric can be created");
    pub static ref RECOMPOSITIONS: IntCounter = IntCounter::new(
        "compositor_recompositions_total",
        "Number of times the overlay frame was recomposed"
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(PLAYBACK_STATE.clone()))?;
        REGISTRY.register(Box::new(SESSIONS_STARTED.clone()))?;
        REGISTRY.register(Box::new(FATAL_ERRORS.clone()))?;
        REGISTRY.register(Box::new(RECOVERABLE_WARNINGS.clone()))?;
        REGISTRY.register(Box::new(STALE_EVENTS.clone()))?;
        REGISTRY.register(Box::new(FRAGMENTS_LOADED.clone()))?;
        REGISTRY.register(Box::new(BYTES_LOADED.clone()))?;
        REGISTRY.register(Box::new(RENDERED_OVERLAYS.clone()))?;
        REGISTRY.register(Box::new(RECOMPOSITIONS.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn cause_label(cause: FailureCause) -> &'static str {
    match cause {
        FailureCause::Resolution => "resolution",
        FailureCause::Network => "network",
        FailureCause::Media => "media",
        FailureCause::Unclassified => "unclassified",
        FailureCause::CapabilityMismatch => "capability_mismatch",
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_state_change(&self, state: PlaybackState) {
        PLAYBACK_STATE.set(state.as_metric() as i64);
    }

    fn report_session_started(&self) {
        SESSIONS_STARTED.inc();
    }

    fn report_fatal_error(&self, cause: FailureCause) {
        FATAL_ERRORS.with_label_values(&[cause_label(cause)]).inc();
    }

    fn report_recoverable_warning(&self) {
        RECOVERABLE_WARNINGS.inc();
    }

    fn report_stale_event(&self) {
        STALE_EVENTS.inc();
    }

    fn report_fragment(&self, bytes: usize) {
        FRAGMENTS_LOADED.inc();
        BYTES_LOADED.inc_by(bytes as u64);
    }

    fn report_composition(&self, rendered_overlays: usize) {
        RENDERED_OVERLAYS.set(rendered_overlays as i64);
        RECOMPOSITIONS.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_updates_gauges() {
        let reporter = PrometheusReporter::new();

        reporter.report_state_change(PlaybackState::Playing);
        assert_eq!(PLAYBACK_STATE.get(), 3);

        reporter.report_composition(4);
        assert_eq!(RENDERED_OVERLAYS.get(), 4);
    }

    #[test]
    fn test_fatal_errors_are_labelled_by_cause() {
        let reporter = PrometheusReporter::new();
        let before = FATAL_ERRORS.with_label_values(&["network"]).get();

        reporter.report_fatal_error(FailureCause::Network);

        assert_eq!(FATAL_ERRORS.with_label_values(&["network"]).get(), before + 1);
    }
}
