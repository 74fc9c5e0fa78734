use crate::domain::value_objects::{FailureCause, PlaybackState};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_state_change(&self, state: PlaybackState);
    fn report_session_started(&self);
    fn report_fatal_error(&self, cause: FailureCause);
    fn report_recoverable_warning(&self);
    fn report_stale_event(&self);
    fn report_fragment(&self, bytes: usize);
    fn report_composition(&self, rendered_overlays: usize);
}

/// Reporter that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsReporter for NoopMetrics {
    fn report_state_change(&self, _state: PlaybackState) {}
    fn report_session_started(&self) {}
    fn report_fatal_error(&self, _cause: FailureCause) {}
    fn report_recoverable_warning(&self) {}
    fn report_stale_event(&self) {}
    fn report_fragment(&self, _bytes: usize) {}
    fn report_composition(&self, _rendered_overlays: usize) {}
}
