use warp::Filter;

use super::PrometheusReporter;

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

fn health(status: &'static str) -> HealthResponse {
    HealthResponse {
        status,
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// `/metrics`, `/health`, `/livez` and `/readyz`
pub fn metrics_routes(
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::path("health").map(|| warp::reply::json(&health("healthy")));

    // Liveness: the process is up
    let liveness_route =
        warp::path("livez").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    let readiness_route = warp::path("readyz").map(|| warp::reply::json(&health("ready")));

    metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .with(cors)
}

pub async fn serve_metrics(port: u16) {
    tracing::info!("Metrics server starting on port {}", port);

    warp::serve(metrics_routes()).run(([0, 0, 0, 0], port)).await;
}
