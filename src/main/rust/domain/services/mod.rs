mod endpoint_resolver;

pub use endpoint_resolver::{EndpointResolver, DEFAULT_HLS_PORT, DEFAULT_PLAYLIST_NAME};
