use tokio::task::JoinHandle;

use crate::domain::events::EventSink;
use crate::domain::value_objects::QualityPreference;

/// Parameters for one adaptive load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub manifest_url: String,
    pub quality: QualityPreference,
    pub reconnect_attempts: u32,
}

/// Port for the adaptive streaming client that feeds segments to a surface.
///
/// Implementations report progress only through `sink`. Aborting the returned
/// task must release everything the load acquired.
pub trait ProtocolClient: Send + Sync {
    fn load(&self, request: LoadRequest, sink: EventSink) -> JoinHandle<()>;
}
