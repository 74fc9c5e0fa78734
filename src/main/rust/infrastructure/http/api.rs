use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::application::services::{OverlayChange, PlayerHandle};
use crate::domain::entities::{OverlayDraft, OverlayPatch};
use crate::domain::errors::DomainError;
use crate::domain::ports::{OverlayStore, SettingsStore};
use crate::domain::value_objects::{SettingsPatch, SurfaceGeometry};

/// Largest JSON body accepted by the API
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Collaborators shared by every request
#[derive(Clone)]
pub struct ApiContext {
    pub overlays: Arc<dyn OverlayStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub player: PlayerHandle,
    /// Held from a store write until the player has been told about it, so
    /// the player sees changes in commit order
    writes: Arc<Mutex<()>>,
}

impl ApiContext {
    pub fn new(
        overlays: Arc<dyn OverlayStore>,
        settings: Arc<dyn SettingsStore>,
        player: PlayerHandle,
    ) -> Self {
        Self {
            overlays,
            settings,
            player,
            writes: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug)]
struct ApiError(DomainError);

impl warp::reject::Reject for ApiError {}

fn reject(error: DomainError) -> Rejection {
    warp::reject::custom(ApiError(error))
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct VolumeRequest {
    volume: f64,
}

fn status_for(error: &DomainError) -> StatusCode {
    match error {
        DomainError::OverlayNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::InvalidTransition { .. }
        | DomainError::PlaybackRejected(_)
        | DomainError::FullscreenUnavailable(_)
        | DomainError::NetworkFatal { .. }
        | DomainError::MediaFatal { .. }
        | DomainError::CapabilityMismatch { .. } => StatusCode::CONFLICT,
        DomainError::PlayerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn with_context(
    context: ApiContext,
) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// All `/api` routes with CORS and JSON error mapping
pub fn api_routes(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let list_overlays = warp::path("api")
        .and(warp::path("overlays"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(list_overlays);

    let create_overlay = warp::path("api")
        .and(warp::path("overlays"))
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body::<OverlayDraft>())
        .and(with_context(context.clone()))
        .and_then(create_overlay);

    let update_overlay = warp::path("api")
        .and(warp::path!("overlays" / String))
        .and(warp::put())
        .and(json_body::<OverlayPatch>())
        .and(with_context(context.clone()))
        .and_then(update_overlay);

    let delete_overlay = warp::path("api")
        .and(warp::path!("overlays" / String))
        .and(warp::delete())
        .and(with_context(context.clone()))
        .and_then(delete_overlay);

    let get_settings = warp::path("api")
        .and(warp::path("settings"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(get_settings);

    let put_settings = warp::path("api")
        .and(warp::path("settings"))
        .and(warp::path::end())
        .and(warp::put())
        .and(json_body::<SettingsPatch>())
        .and(with_context(context.clone()))
        .and_then(put_settings);

    let player_status = warp::path("api")
        .and(warp::path("player"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(context.clone()))
        .and_then(player_status);

    let player_action = warp::path("api")
        .and(warp::path!("player" / String))
        .and(warp::post())
        .and(with_context(context.clone()))
        .and_then(player_action);

    let set_volume = warp::path("api")
        .and(warp::path!("player" / "volume"))
        .and(warp::put())
        .and(json_body::<VolumeRequest>())
        .and(with_context(context.clone()))
        .and_then(set_volume);

    let resize = warp::path("api")
        .and(warp::path!("player" / "surface"))
        .and(warp::put())
        .and(json_body::<SurfaceGeometry>())
        .and(with_context(context.clone()))
        .and_then(resize);

    let frame = warp::path("api")
        .and(warp::path("frame"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(context))
        .and_then(frame);

    list_overlays
        .or(create_overlay)
        .or(update_overlay)
        .or(delete_overlay)
        .or(get_settings)
        .or(put_settings)
        .or(player_status)
        .or(player_action)
        .or(set_volume)
        .or(resize)
        .or(frame)
        .recover(handle_rejection)
        .with(cors)
}

async fn list_overlays(context: ApiContext) -> Result<impl Reply, Rejection> {
    let overlays = context.overlays.list().await.map_err(reject)?;
    Ok(warp::reply::json(&overlays))
}

async fn create_overlay(
    draft: OverlayDraft,
    context: ApiContext,
) -> Result<impl Reply, Rejection> {
    let _write = context.writes.lock().await;
    let record = context.overlays.create(draft).await.map_err(reject)?;
    context
        .player
        .overlay_changed(OverlayChange::Created(record.clone()))
        .await
        .map_err(reject)?;
    Ok(warp::reply::with_status(
        warp::reply::json(&record),
        StatusCode::CREATED,
    ))
}

async fn update_overlay(
    id: String,
    patch: OverlayPatch,
    context: ApiContext,
) -> Result<impl Reply, Rejection> {
    let _write = context.writes.lock().await;
    let record = context.overlays.update(&id, patch).await.map_err(reject)?;
    context
        .player
        .overlay_changed(OverlayChange::Updated(record.clone()))
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&record))
}

async fn delete_overlay(id: String, context: ApiContext) -> Result<impl Reply, Rejection> {
    let _write = context.writes.lock().await;
    context.overlays.delete(&id).await.map_err(reject)?;
    context
        .player
        .overlay_changed(OverlayChange::Deleted(id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_settings(context: ApiContext) -> Result<impl Reply, Rejection> {
    let settings = context.settings.get().await.map_err(reject)?;
    Ok(warp::reply::json(&settings))
}

async fn put_settings(patch: SettingsPatch, context: ApiContext) -> Result<impl Reply, Rejection> {
    let _write = context.writes.lock().await;
    let settings = context.settings.set(patch).await.map_err(reject)?;
    context
        .player
        .apply_settings(settings.clone())
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&settings))
}

async fn player_status(context: ApiContext) -> Result<impl Reply, Rejection> {
    let status = context.player.status().await.map_err(reject)?;
    Ok(warp::reply::json(&status))
}

async fn player_action(action: String, context: ApiContext) -> Result<impl Reply, Rejection> {
    let player = &context.player;
    let status = match action.as_str() {
        "retry" => player.retry().await,
        "toggle-play" => player.toggle_play().await,
        "toggle-mute" => player.toggle_mute().await,
        "fullscreen" => player.request_fullscreen().await,
        _ => return Err(warp::reject::not_found()),
    }
    .map_err(reject)?;
    Ok(warp::reply::json(&status))
}

async fn set_volume(request: VolumeRequest, context: ApiContext) -> Result<impl Reply, Rejection> {
    let status = context
        .player
        .set_volume(request.volume)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&status))
}

async fn resize(geometry: SurfaceGeometry, context: ApiContext) -> Result<impl Reply, Rejection> {
    if geometry.width == 0 || geometry.height == 0 {
        return Err(reject(DomainError::InvalidSettings(
            "surface dimensions must be positive".to_string(),
        )));
    }
    let status = context.player.resize(geometry).await.map_err(reject)?;
    Ok(warp::reply::json(&status))
}

async fn frame(context: ApiContext) -> Result<impl Reply, Rejection> {
    let frame = context.player.frame().await.map_err(reject)?;
    Ok(warp::reply::json(&frame))
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(ApiError(error)) = rejection.find::<ApiError>() {
        let status = status_for(error);
        if status.is_server_error() {
            tracing::error!(error = %error, "API request failed");
        } else {
            tracing::debug!(error = %error, "API request rejected");
        }
        (status, error.to_string())
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Malformed payload: {}", e))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::error!(?rejection, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}
