mod api;

pub use api::{api_routes, ApiContext};
