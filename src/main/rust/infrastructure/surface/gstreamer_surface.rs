use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Context;
use bytes::Bytes;
use gstreamer::prelude::*;

use crate::domain::errors::{DomainError, Result};
use crate::domain::events::{EventSink, SessionEvent, SessionId};
use crate::domain::ports::{PlayError, PlayOrigin, PlaybackSurface, SurfaceCapabilities};
use crate::domain::value_objects::{ErrorKind, ProtocolError, SurfaceGeometry};

/// Timeout for bus polling (100ms allows responsive teardown)
const BUS_POLL_TIMEOUT_MS: u64 = 100;

struct BusWatcher {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Native-HLS surface backed by a GStreamer `playbin`
pub struct GStreamerSurface {
    geometry: SurfaceGeometry,
    playbin: Option<gstreamer::Element>,
    watcher: Option<BusWatcher>,
    volume: f64,
    muted: bool,
}

impl GStreamerSurface {
    pub fn new(geometry: SurfaceGeometry) -> anyhow::Result<Self> {
        gstreamer::init().context("Failed to initialize GStreamer")?;

        Ok(Self {
            geometry,
            playbin: None,
            watcher: None,
            volume: 1.0,
            muted: false,
        })
    }

    fn spawn_bus_watcher(bus: gstreamer::Bus, sink: EventSink) -> BusWatcher {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = std::thread::spawn(move || {
            let timeout = gstreamer::ClockTime::from_mseconds(BUS_POLL_TIMEOUT_MS);
            let mut prerolled = false;

            while flag.load(Ordering::SeqCst) {
                let Some(msg) = bus.timed_pop(timeout) else {
                    continue;
                };
                if let Some(event) = bus_event(&msg, &mut prerolled) {
                    if !sink.emit(event) {
                        break;
                    }
                }
            }
            tracing::debug!(session_id = %sink.session(), "Bus watcher stopped");
        });

        BusWatcher { running, handle }
    }
}

/// Map a bus message onto a session event; only the first AsyncDone counts as preroll
fn bus_event(msg: &gstreamer::Message, prerolled: &mut bool) -> Option<SessionEvent> {
    use gstreamer::MessageView;

    match msg.view() {
        MessageView::AsyncDone(_) if !*prerolled => {
            *prerolled = true;
            Some(SessionEvent::ManifestParsed {
                levels: 1,
                selected_level: 0,
            })
        }
        MessageView::Eos(_) => Some(SessionEvent::EndOfStream),
        MessageView::Error(err) => {
            let kind = if err.error().is::<gstreamer::ResourceError>() {
                ErrorKind::Network
            } else {
                ErrorKind::Media
            };
            Some(SessionEvent::Error(ProtocolError {
                kind,
                details: format!(
                    "Error from {:?}: {} ({:?})",
                    err.src().map(|s| s.path_string()),
                    err.error(),
                    err.debug()
                ),
                fatal: true,
            }))
        }
        MessageView::Warning(warn) => {
            let details = format!(
                "Warning from {:?}: {} ({:?})",
                warn.src().map(|s| s.path_string()),
                warn.error(),
                warn.debug()
            );
            Some(SessionEvent::Error(ProtocolError::other(details, false)))
        }
        _ => None,
    }
}

impl PlaybackSurface for GStreamerSurface {
    fn capabilities(&self) -> SurfaceCapabilities {
        let native_hls = gstreamer::ElementFactory::find("hlsdemux2").is_some()
            || gstreamer::ElementFactory::find("hlsdemux").is_some();

        SurfaceCapabilities {
            segment_feed: false,
            native_hls,
        }
    }

    fn attach_feed(&mut self, session: SessionId, _buffer_seconds: u32) {
        tracing::error!(session_id = %session, "GStreamer surface does not accept fed segments");
    }

    fn append_segment(&mut self, _sequence: u64, _duration: f64, _data: Bytes) {}

    fn attach_source(&mut self, manifest_url: &str, sink: EventSink) {
        self.detach();

        let playbin = match gstreamer::ElementFactory::make("playbin")
            .property("uri", manifest_url)
            .build()
        {
            Ok(playbin) => playbin,
            Err(e) => {
                sink.emit(SessionEvent::Error(ProtocolError::media(
                    format!("playbin unavailable: {}", e),
                    true,
                )));
                return;
            }
        };

        playbin.set_property("volume", self.volume);
        playbin.set_property("mute", self.muted);

        let Some(bus) = playbin.bus() else {
            sink.emit(SessionEvent::Error(ProtocolError::media(
                "Failed to get bus",
                true,
            )));
            return;
        };
        self.watcher = Some(Self::spawn_bus_watcher(bus, sink.clone()));

        // Preroll; completion arrives on the bus as AsyncDone
        if let Err(e) = playbin.set_state(gstreamer::State::Paused) {
            sink.emit(SessionEvent::Error(ProtocolError::media(
                format!("Failed to preroll {}: {}", manifest_url, e),
                true,
            )));
        }
        self.playbin = Some(playbin);
    }

    fn detach(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.running.store(false, Ordering::SeqCst);
            if watcher.handle.join().is_err() {
                tracing::error!("Bus watcher thread panicked");
            }
        }
        if let Some(playbin) = self.playbin.take() {
            let _ = playbin.set_state(gstreamer::State::Null);
        }
    }

    fn play(&mut self, _origin: PlayOrigin) -> std::result::Result<(), PlayError> {
        let playbin = self
            .playbin
            .as_ref()
            .ok_or_else(|| PlayError::Failed("no source attached".to_string()))?;
        playbin
            .set_state(gstreamer::State::Playing)
            .map(|_| ())
            .map_err(|e| PlayError::Failed(e.to_string()))
    }

    fn pause(&mut self) {
        if let Some(playbin) = &self.playbin {
            let _ = playbin.set_state(gstreamer::State::Paused);
        }
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(playbin) = &self.playbin {
            playbin.set_property("volume", self.volume);
        }
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(playbin) = &self.playbin {
            playbin.set_property("mute", muted);
        }
    }

    fn request_fullscreen(&mut self) -> Result<SurfaceGeometry> {
        Err(DomainError::FullscreenUnavailable(
            "GStreamer surface renders headless".to_string(),
        ))
    }

    fn resize(&mut self, geometry: SurfaceGeometry) {
        self.geometry = geometry;
    }

    fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }
}

impl Drop for GStreamerSurface {
    fn drop(&mut self) {
        self.detach();
    }
}
