mod hls_client;
mod http_fetcher;
pub mod playlist;

pub use hls_client::{HlsClient, HlsClientConfig, HlsProtocolClient};
pub use http_fetcher::HttpFetcher;
