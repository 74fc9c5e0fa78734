pub mod hls;
pub mod http;
pub mod metrics;
pub mod storage;
pub mod surface;
