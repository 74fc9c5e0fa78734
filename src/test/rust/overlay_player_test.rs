use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use warp::Filter;

use overlay_player::domain::entities::OverlayKind;
use overlay_player::domain::errors::DomainError;
use overlay_player::domain::ports::{FetchError, NoopMetrics, OverlayStore};
use overlay_player::domain::value_objects::FailureCause;
use overlay_player::{
    api_routes, ApiContext, BackoffPolicy, DocumentStore, EndpointResolver, HlsProtocolClient,
    HttpFetcher, MediaFetcher, MemorySurface, OverlayCompositor, OverlayDraft, OverlayPatch,
    PlaybackState, PlayerHandle, PlayerService, PlayerSettings, PlayerStatus, SessionController,
    SessionOptions, SurfaceGeometry,
};

const PLAYLIST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n\
    #EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:2.0,\nseg0.ts\n#EXTINF:2.0,\nseg1.ts\n#EXT-X-ENDLIST\n";

/// Minimal media server publishing `mystream` on a random local port
async fn spawn_hls_origin() -> SocketAddr {
    let playlist = warp::path!("mystream" / "index.m3u8").map(|| PLAYLIST);
    let segments =
        warp::path!("mystream" / String).map(|name: String| format!("payload of {}", name));

    let (addr, server) = warp::serve(playlist.or(segments)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

/// A local port nothing listens on
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(20), 2.0).unwrap()
}

fn spawn_player(hls_port: u16, surface: MemorySurface) -> (PlayerHandle, Arc<DocumentStore>) {
    let store = Arc::new(DocumentStore::in_memory(PlayerSettings::default()));
    let fetcher: Arc<dyn MediaFetcher> = Arc::new(HttpFetcher::new().unwrap());
    let metrics = Arc::new(NoopMetrics);

    let (controller, events) = SessionController::new(
        surface,
        Arc::new(HlsProtocolClient::new(fetcher.clone(), fast_backoff())),
        store.clone(),
        metrics.clone(),
        SessionOptions::default(),
    );
    let compositor = OverlayCompositor::new(SurfaceGeometry::default(), metrics);
    let (player, _task) = PlayerService::new(
        controller,
        compositor,
        EndpointResolver::new(hls_port),
        fetcher,
    )
    .spawn(events);

    (player, store)
}

fn locator_settings(locator: &str, reconnect_attempts: u32) -> PlayerSettings {
    PlayerSettings {
        source_locator: locator.to_string(),
        reconnect_attempts,
        ..PlayerSettings::default()
    }
}

async fn wait_for_state(player: &PlayerHandle, state: PlaybackState) -> PlayerStatus {
    for _ in 0..300 {
        let status = player.status().await.unwrap();
        if status.state == state {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("player never reached {}", state);
}

#[test]
fn test_protocol_locator_resolves_to_media_server_convention() {
    let resolver = EndpointResolver::default();

    assert_eq!(
        resolver.resolve("rtsp://host:554/mystream"),
        "http://host:8888/mystream/index.m3u8"
    );
    assert_eq!(
        resolver.resolve("rtsp://h/foo/bar"),
        "http://h:8888/bar/index.m3u8"
    );
    assert_eq!(
        resolver.resolve("https://cdn.example.com/live/master.m3u8"),
        "https://cdn.example.com/live/master.m3u8"
    );
}

#[tokio::test]
async fn test_reachable_manifest_plays_end_to_end() {
    let origin = spawn_hls_origin().await;
    let (player, _store) = spawn_player(origin.port(), MemorySurface::default());

    let status = player
        .apply_settings(locator_settings("rtsp://127.0.0.1:554/mystream", 1))
        .await
        .unwrap();
    assert_eq!(status.state, PlaybackState::Connecting);
    assert_eq!(
        status.manifest_url,
        Some(format!("http://127.0.0.1:{}/mystream/index.m3u8", origin.port()))
    );

    let status = wait_for_state(&player, PlaybackState::Playing).await;
    assert!(status.last_failure.is_none());
    assert_eq!(status.load_attempts, 1);
}

#[tokio::test]
async fn test_blocked_autoplay_waits_in_ready() {
    let origin = spawn_hls_origin().await;
    let surface = MemorySurface::default().with_autoplay(false);
    let (player, _store) = spawn_player(origin.port(), surface);

    player
        .apply_settings(locator_settings("rtsp://127.0.0.1/mystream", 1))
        .await
        .unwrap();

    wait_for_state(&player, PlaybackState::Ready).await;
    let status = player.toggle_play().await.unwrap();
    assert_eq!(status.state, PlaybackState::Playing);
}

#[tokio::test]
async fn test_network_failure_errors_and_retry_reuses_url() {
    let port = closed_port();
    let (player, _store) = spawn_player(port, MemorySurface::default());

    player
        .apply_settings(locator_settings("rtsp://127.0.0.1/mystream", 1))
        .await
        .unwrap();

    let errored = wait_for_state(&player, PlaybackState::Errored).await;
    let failure = errored.last_failure.clone().unwrap();
    let expected_url = format!("http://127.0.0.1:{}/mystream/index.m3u8", port);
    assert_eq!(failure.cause, FailureCause::Network);
    assert!(failure.message().contains(&expected_url));
    assert_eq!(errored.session, None);

    match player.toggle_play().await {
        Err(DomainError::NetworkFatal { manifest_url, .. }) => {
            assert_eq!(manifest_url, expected_url)
        }
        other => panic!("expected network failure, got {:?}", other),
    }

    let retried = player.retry().await.unwrap();
    assert_eq!(retried.state, PlaybackState::Connecting);
    assert_eq!(retried.manifest_url.as_deref(), Some(expected_url.as_str()));
    assert_eq!(retried.load_attempts, 2);
}

/// Never answers; holds every load open until the session is torn down
struct HangingFetcher;

#[async_trait]
impl MediaFetcher for HangingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Bytes, FetchError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_rapid_restarts_leave_one_session_and_no_leaked_listeners() {
    let fetcher: Arc<dyn MediaFetcher> = Arc::new(HangingFetcher);
    let (mut controller, _events) = SessionController::new(
        MemorySurface::default(),
        Arc::new(HlsProtocolClient::new(fetcher, fast_backoff())),
        Arc::new(DocumentStore::in_memory(PlayerSettings::default())),
        Arc::new(NoopMetrics),
        SessionOptions::default(),
    );

    for stream in ["a", "b", "c"] {
        controller
            .start(&format!("http://media:8888/{}/index.m3u8", stream))
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(controller.live_listeners(), 1);
    assert_eq!(controller.surface().active_attachments(), 1);
    assert_eq!(controller.state(), PlaybackState::Connecting);
    assert_eq!(
        controller.manifest_url(),
        Some("http://media:8888/c/index.m3u8")
    );

    controller.cleanup();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(controller.live_listeners(), 0);
    assert_eq!(controller.surface().active_attachments(), 0);
}

#[tokio::test]
async fn test_api_overlay_changes_drive_composition() {
    let (player, store) = spawn_player(closed_port(), MemorySurface::default());
    let routes = api_routes(ApiContext::new(store.clone(), store.clone(), player.clone()));

    let first = store
        .create(OverlayDraft::new(OverlayKind::Text, "first").at(0.0, 0.0))
        .await
        .unwrap();
    player
        .replace_overlays(store.list().await.unwrap())
        .await
        .unwrap();

    let created = warp::test::request()
        .method("POST")
        .path("/api/overlays")
        .json(&serde_json::json!({
            "type": "logo",
            "content": "ACME",
            "position": { "x": 25.0, "y": 50.0 }
        }))
        .reply(&routes)
        .await;
    assert_eq!(created.status(), 201);

    // Editing the older overlay must not lift it above the newer one
    let response = warp::test::request()
        .method("PUT")
        .path(&format!("/api/overlays/{}", first.id))
        .json(&OverlayPatch {
            content: Some("edited".to_string()),
            ..OverlayPatch::default()
        })
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);

    let frame = player.frame().await.unwrap();
    assert_eq!(frame.overlays.len(), 2);
    assert_eq!(frame.overlays[0].id, first.id);
    assert_eq!((frame.overlays[1].x, frame.overlays[1].y), (320.0, 360.0));

    let response = warp::test::request()
        .method("PUT")
        .path(&format!("/api/overlays/{}", first.id))
        .json(&OverlayPatch::visibility(false))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 200);

    let frame = player.frame().await.unwrap();
    assert_eq!(frame.overlays.len(), 1);
    assert_ne!(frame.overlays[0].id, first.id);
    assert_eq!(frame.overlays[0].z_index, 1);
}
