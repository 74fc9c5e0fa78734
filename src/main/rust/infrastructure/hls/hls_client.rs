//! Adaptive HLS client
//!
//! Runs as one spawned task per session. It loads the manifest, picks a
//! variant, then follows the media playlist and pushes every fragment to the
//! controller through the session's [`EventSink`]. Aborting the task is the
//! only teardown it needs: it holds no other resources.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use super::playlist::{parse_playlist, select_variant, MediaPlaylist, Playlist};
use crate::domain::events::{EventSink, SessionEvent};
use crate::domain::ports::{LoadRequest, MediaFetcher, ProtocolClient};
use crate::domain::value_objects::{BackoffPolicy, ProtocolError, QualityPreference};

/// Never poll a live playlist faster than this
const MIN_REFRESH_SECS: f64 = 0.5;
/// Never wait longer than this between live playlist reloads
const MAX_REFRESH_SECS: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct HlsClientConfig {
    pub quality: QualityPreference,
    /// Retries per fetch before the failure becomes fatal
    pub reconnect_attempts: u32,
    pub backoff: BackoffPolicy,
    /// How many trailing segments of a live playlist to start with
    pub live_edge_segments: usize,
}

impl Default for HlsClientConfig {
    fn default() -> Self {
        Self {
            quality: QualityPreference::Auto,
            reconnect_attempts: 3,
            backoff: BackoffPolicy::default(),
            live_edge_segments: 3,
        }
    }
}

pub struct HlsClient {
    fetcher: Arc<dyn MediaFetcher>,
    config: HlsClientConfig,
    manifest_url: String,
    sink: EventSink,
}

impl HlsClient {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        config: HlsClientConfig,
        manifest_url: impl Into<String>,
        sink: EventSink,
    ) -> Self {
        Self {
            fetcher,
            config,
            manifest_url: manifest_url.into(),
            sink,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tracing::debug!(
            session_id = %self.sink.session(),
            manifest_url = %self.manifest_url,
            "HLS client started"
        );

        if let Err(error) = self.drive().await {
            self.sink.emit(SessionEvent::Error(error));
        }
    }

    async fn drive(&self) -> Result<(), ProtocolError> {
        let content = self.fetch_with_retry(&self.manifest_url, "manifest").await?;
        let playlist = parse_playlist(&String::from_utf8_lossy(&content), &self.manifest_url)
            .map_err(|e| ProtocolError::media(format!("manifest parsing failed: {}", e), true))?;

        let (media_url, mut media, levels, selected_level) = match playlist {
            Playlist::Master(variants) => {
                let selected = select_variant(&variants, self.config.quality);
                let url = variants[selected].uri.clone();
                tracing::info!(
                    session_id = %self.sink.session(),
                    levels = variants.len(),
                    selected,
                    variant_url = %url,
                    "Master playlist parsed"
                );
                let media = self.load_media_playlist(&url).await?;
                (url, media, variants.len(), selected)
            }
            Playlist::Media(media) => (self.manifest_url.clone(), media, 1, 0),
        };

        if !self.sink.emit(SessionEvent::ManifestParsed {
            levels,
            selected_level,
        }) {
            return Ok(());
        }

        let mut next_sequence = self.first_sequence(&media);

        loop {
            let from = next_sequence;
            for segment in media.segments.iter().filter(|s| s.sequence >= from) {
                let data = self.fetch_with_retry(&segment.uri, "fragment").await?;
                let delivered = self.sink.emit(SessionEvent::FragmentLoaded {
                    sequence: segment.sequence,
                    duration: segment.duration,
                    data,
                });
                if !delivered {
                    return Ok(());
                }
                next_sequence = segment.sequence.saturating_add(1);
            }

            if media.ended {
                self.sink.emit(SessionEvent::EndOfStream);
                return Ok(());
            }

            tokio::time::sleep(refresh_interval(media.target_duration)?).await;
            let previous_sequence = media.media_sequence;
            media = self.load_media_playlist(&media_url).await?;

            if media.media_sequence < previous_sequence {
                tracing::warn!(
                    session_id = %self.sink.session(),
                    previous_sequence,
                    media_sequence = media.media_sequence,
                    "Media sequence went backwards, rejoining the live edge"
                );
                next_sequence = self.first_sequence(&media);
            }
        }
    }

    /// VOD plays from the start, live joins near the edge
    fn first_sequence(&self, media: &MediaPlaylist) -> u64 {
        if media.ended {
            return media.media_sequence;
        }
        let start = media
            .segments
            .len()
            .saturating_sub(self.config.live_edge_segments);
        media
            .segments
            .get(start)
            .map(|s| s.sequence)
            .unwrap_or(media.media_sequence)
    }

    async fn load_media_playlist(&self, url: &str) -> Result<MediaPlaylist, ProtocolError> {
        let content = self.fetch_with_retry(url, "level playlist").await?;
        match parse_playlist(&String::from_utf8_lossy(&content), url) {
            Ok(Playlist::Media(media)) => Ok(media),
            Ok(Playlist::Master(_)) => Err(ProtocolError::media(
                format!("nested master playlist at {}", url),
                true,
            )),
            Err(e) => Err(ProtocolError::media(
                format!("level playlist parsing failed: {}", e),
                true,
            )),
        }
    }

    /// Failed attempts are reported as recoverable until retries run out
    async fn fetch_with_retry(&self, url: &str, what: &str) -> Result<Bytes, ProtocolError> {
        let mut retry = 0u32;

        loop {
            match self.fetcher.fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    let details = format!("{} load failed for {}: {}", what, url, e);
                    if retry >= self.config.reconnect_attempts {
                        return Err(ProtocolError::network(details, true));
                    }

                    retry += 1;
                    self.sink
                        .emit(SessionEvent::Error(ProtocolError::network(details, false)));
                    tokio::time::sleep(self.config.backoff.delay_for_retry(retry)).await;
                }
            }
        }
    }
}

/// Wait between live playlist reloads, bounded on both sides
fn refresh_interval(target_duration: f64) -> Result<Duration, ProtocolError> {
    Duration::try_from_secs_f64(target_duration.clamp(MIN_REFRESH_SECS, MAX_REFRESH_SECS))
        .map_err(|e| {
            ProtocolError::media(
                format!("invalid target duration {}: {}", target_duration, e),
                true,
            )
        })
}

/// [`ProtocolClient`] that spawns one [`HlsClient`] per load
pub struct HlsProtocolClient {
    fetcher: Arc<dyn MediaFetcher>,
    backoff: BackoffPolicy,
    live_edge_segments: usize,
}

impl HlsProtocolClient {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, backoff: BackoffPolicy) -> Self {
        Self {
            fetcher,
            backoff,
            live_edge_segments: HlsClientConfig::default().live_edge_segments,
        }
    }

    pub fn with_live_edge(mut self, segments: usize) -> Self {
        self.live_edge_segments = segments.max(1);
        self
    }
}

impl ProtocolClient for HlsProtocolClient {
    fn load(&self, request: LoadRequest, sink: EventSink) -> JoinHandle<()> {
        let config = HlsClientConfig {
            quality: request.quality,
            reconnect_attempts: request.reconnect_attempts,
            backoff: self.backoff.clone(),
            live_edge_segments: self.live_edge_segments,
        };
        HlsClient::new(self.fetcher.clone(), config, request.manifest_url, sink).spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::domain::events::{SessionEnvelope, SessionId};
    use crate::domain::ports::FetchError;
    use crate::domain::value_objects::ErrorKind;

    /// Serves canned responses; unknown URLs answer 404
    struct StaticFetcher {
        responses: Mutex<HashMap<String, Vec<Result<Bytes, FetchError>>>>,
    }

    impl StaticFetcher {
        fn new(entries: Vec<(&str, Vec<Result<&str, FetchError>>)>) -> Self {
            let responses = entries
                .into_iter()
                .map(|(url, results)| {
                    let results = results
                        .into_iter()
                        .map(|r| r.map(|body| Bytes::from(body.to_string())))
                        .collect();
                    (url.to_string(), results)
                })
                .collect();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) if queue.len() == 1 => queue[0].clone(),
                _ => Err(FetchError::Status(404)),
            }
        }
    }

    fn test_config(reconnect_attempts: u32) -> HlsClientConfig {
        HlsClientConfig {
            reconnect_attempts,
            backoff: BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(2), 2.0)
                .unwrap(),
            ..HlsClientConfig::default()
        }
    }

    async fn run_client(
        fetcher: StaticFetcher,
        config: HlsClientConfig,
        url: &str,
    ) -> Vec<SessionEnvelope> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(SessionId(1), tx, Arc::new(()));
        HlsClient::new(Arc::new(fetcher), config, url, sink)
            .spawn()
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            events.push(envelope);
        }
        events
    }

    const VOD: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:2\n\
        #EXTINF:2.0,\na.ts\n#EXTINF:2.0,\nb.ts\n#EXT-X-ENDLIST\n";

    #[tokio::test]
    async fn test_vod_playlist_emits_parse_fragments_and_end() {
        let fetcher = StaticFetcher::new(vec![
            ("http://h:8888/s/index.m3u8", vec![Ok(VOD)]),
            ("http://h:8888/s/a.ts", vec![Ok("AAAA")]),
            ("http://h:8888/s/b.ts", vec![Ok("BB")]),
        ]);

        let events = run_client(fetcher, test_config(0), "http://h:8888/s/index.m3u8").await;

        assert!(matches!(
            events[0].event,
            SessionEvent::ManifestParsed {
                levels: 1,
                selected_level: 0
            }
        ));
        assert!(matches!(
            events[1].event,
            SessionEvent::FragmentLoaded { sequence: 0, .. }
        ));
        assert!(matches!(
            events[2].event,
            SessionEvent::FragmentLoaded { sequence: 1, .. }
        ));
        assert!(matches!(events[3].event, SessionEvent::EndOfStream));
        assert!(events.iter().all(|e| e.session == SessionId(1)));
    }

    #[tokio::test]
    async fn test_master_playlist_follows_selected_variant() {
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=100,RESOLUTION=320x180\nlow.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=900,RESOLUTION=1280x720\nhigh.m3u8\n";
        let fetcher = StaticFetcher::new(vec![
            ("http://h:8888/s/index.m3u8", vec![Ok(master)]),
            ("http://h:8888/s/high.m3u8", vec![Ok(VOD)]),
            ("http://h:8888/s/a.ts", vec![Ok("A")]),
            ("http://h:8888/s/b.ts", vec![Ok("B")]),
        ]);

        let events = run_client(fetcher, test_config(0), "http://h:8888/s/index.m3u8").await;

        assert!(matches!(
            events[0].event,
            SessionEvent::ManifestParsed {
                levels: 2,
                selected_level: 1
            }
        ));
        assert!(matches!(events.last().unwrap().event, SessionEvent::EndOfStream));
    }

    #[tokio::test]
    async fn test_retries_are_recoverable_until_exhausted() {
        let fetcher = StaticFetcher::new(vec![(
            "http://h:8888/s/index.m3u8",
            vec![Err(FetchError::Transport("connection refused".to_string()))],
        )]);

        let events = run_client(fetcher, test_config(2), "http://h:8888/s/index.m3u8").await;

        let errors: Vec<&ProtocolError> = events
            .iter()
            .filter_map(|e| match &e.event {
                SessionEvent::Error(error) => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 3);
        assert!(!errors[0].fatal);
        assert!(!errors[1].fatal);
        assert!(errors[2].fatal);
        assert!(errors[2].details.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let fetcher = StaticFetcher::new(vec![
            (
                "http://h:8888/s/index.m3u8",
                vec![Err(FetchError::Status(503)), Ok(VOD)],
            ),
            ("http://h:8888/s/a.ts", vec![Ok("A")]),
            ("http://h:8888/s/b.ts", vec![Ok("B")]),
        ]);

        let events = run_client(fetcher, test_config(3), "http://h:8888/s/index.m3u8").await;

        assert!(matches!(&events[0].event, SessionEvent::Error(e) if !e.fatal));
        assert!(matches!(events[1].event, SessionEvent::ManifestParsed { .. }));
        assert!(matches!(events.last().unwrap().event, SessionEvent::EndOfStream));
    }

    #[tokio::test]
    async fn test_garbage_manifest_is_fatal_media_error() {
        let fetcher = StaticFetcher::new(vec![(
            "http://h:8888/s/index.m3u8",
            vec![Ok("<html>not found</html>")],
        )]);

        let events = run_client(fetcher, test_config(0), "http://h:8888/s/index.m3u8").await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].event,
            SessionEvent::Error(e) if e.fatal && e.kind == ErrorKind::Media
        ));
    }

    #[tokio::test]
    async fn test_oversized_target_duration_is_fatal_media_error() {
        let live = "#EXTM3U\n#EXT-X-TARGETDURATION:1e300\n#EXTINF:2.0,\na.ts\n";
        let fetcher = StaticFetcher::new(vec![
            ("http://h:8888/s/index.m3u8", vec![Ok(live)]),
            ("http://h:8888/s/a.ts", vec![Ok("A")]),
        ]);

        let events = run_client(fetcher, test_config(0), "http://h:8888/s/index.m3u8").await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].event,
            SessionEvent::Error(e) if e.fatal && e.details.contains("1e300")
        ));
    }

    #[test]
    fn test_refresh_interval_is_bounded() {
        assert_eq!(refresh_interval(0.0).unwrap(), Duration::from_millis(500));
        assert_eq!(refresh_interval(4.0).unwrap(), Duration::from_secs(4));
        assert_eq!(refresh_interval(1e300).unwrap(), Duration::from_secs(60));
        assert_eq!(refresh_interval(f64::INFINITY).unwrap(), Duration::from_secs(60));
        assert!(refresh_interval(f64::NAN).unwrap_err().fatal);
    }

    #[tokio::test]
    async fn test_sequence_reset_rejoins_restarted_stream() {
        let before = "#EXTM3U\n#EXT-X-TARGETDURATION:0\n#EXT-X-MEDIA-SEQUENCE:100\n\
            #EXTINF:1,\nx100.ts\n";
        let after = "#EXTM3U\n#EXT-X-TARGETDURATION:0\n#EXT-X-MEDIA-SEQUENCE:0\n\
            #EXTINF:1,\nr0.ts\n#EXT-X-ENDLIST\n";
        let fetcher = StaticFetcher::new(vec![
            ("http://h:8888/s/index.m3u8", vec![Ok(before), Ok(after)]),
            ("http://h:8888/s/x100.ts", vec![Ok("old")]),
            ("http://h:8888/s/r0.ts", vec![Ok("new")]),
        ]);

        let events = run_client(fetcher, test_config(0), "http://h:8888/s/index.m3u8").await;

        let sequences: Vec<u64> = events
            .iter()
            .filter_map(|e| match e.event {
                SessionEvent::FragmentLoaded { sequence, .. } => Some(sequence),
                _ => None,
            })
            .collect();
        assert_eq!(sequences, vec![100, 0]);
        assert!(matches!(events.last().unwrap().event, SessionEvent::EndOfStream));
    }

    #[test]
    fn test_live_playlist_starts_near_edge() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = HlsClient::new(
            Arc::new(StaticFetcher::new(vec![])),
            test_config(0),
            "http://h/p.m3u8",
            EventSink::new(SessionId(1), tx, Arc::new(())),
        );
        let media = MediaPlaylist {
            target_duration: 2.0,
            media_sequence: 100,
            segments: (100..110)
                .map(|sequence| super::super::playlist::Segment {
                    sequence,
                    duration: 2.0,
                    uri: format!("http://h/{}.ts", sequence),
                })
                .collect(),
            ended: false,
        };
        assert_eq!(client.first_sequence(&media), 107);
    }

    #[tokio::test]
    async fn test_protocol_client_passes_request_through() {
        let fetcher = StaticFetcher::new(vec![
            ("http://h:8888/s/index.m3u8", vec![Ok(VOD)]),
            ("http://h:8888/s/a.ts", vec![Ok("A")]),
            ("http://h:8888/s/b.ts", vec![Ok("B")]),
        ]);
        let client = HlsProtocolClient::new(Arc::new(fetcher), BackoffPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        client
            .load(
                LoadRequest {
                    manifest_url: "http://h:8888/s/index.m3u8".to_string(),
                    quality: QualityPreference::Auto,
                    reconnect_attempts: 0,
                },
                EventSink::new(SessionId(4), tx, Arc::new(())),
            )
            .await
            .unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.session, SessionId(4));
        assert!(matches!(first.event, SessionEvent::ManifestParsed { .. }));
    }
}
