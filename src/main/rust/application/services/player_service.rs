use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::overlay_compositor::{ComposedFrame, ImageRequest, OverlayChange, OverlayCompositor};
use super::session_controller::{PlayerStatus, SessionController, SessionOptions};
use crate::domain::entities::OverlayRecord;
use crate::domain::errors::{DomainError, Result};
use crate::domain::events::SessionEvents;
use crate::domain::ports::{MediaFetcher, PlaybackSurface};
use crate::domain::services::EndpointResolver;
use crate::domain::value_objects::{PlayerSettings, SurfaceGeometry};

/// Pending commands before senders wait
const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<T>;

pub enum PlayerCommand {
    ApplySettings(PlayerSettings, Reply<Result<PlayerStatus>>),
    Retry(Reply<Result<PlayerStatus>>),
    TogglePlay(Reply<Result<PlayerStatus>>),
    ToggleMute(Reply<PlayerStatus>),
    SetVolume(f64, Reply<Result<PlayerStatus>>),
    RequestFullscreen(Reply<Result<PlayerStatus>>),
    Resize(SurfaceGeometry, Reply<PlayerStatus>),
    ReplaceOverlays(Vec<OverlayRecord>),
    OverlayChanged(OverlayChange),
    ImageChecked {
        overlay_id: String,
        src: String,
        loaded: bool,
    },
    Status(Reply<PlayerStatus>),
    Frame(Reply<ComposedFrame>),
    Shutdown,
}

/// Cloneable front door to a running [`PlayerService`]
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlayerCommand>,
}

impl PlayerHandle {
    async fn send(&self, command: PlayerCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| DomainError::PlayerUnavailable)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> PlayerCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| DomainError::PlayerUnavailable)
    }

    /// Apply a settings document; a changed source locator restarts playback
    pub async fn apply_settings(&self, settings: PlayerSettings) -> Result<PlayerStatus> {
        self.request(|reply| PlayerCommand::ApplySettings(settings, reply))
            .await?
    }

    pub async fn retry(&self) -> Result<PlayerStatus> {
        self.request(PlayerCommand::Retry).await?
    }

    pub async fn toggle_play(&self) -> Result<PlayerStatus> {
        self.request(PlayerCommand::TogglePlay).await?
    }

    pub async fn toggle_mute(&self) -> Result<PlayerStatus> {
        self.request(PlayerCommand::ToggleMute).await
    }

    pub async fn set_volume(&self, volume: f64) -> Result<PlayerStatus> {
        self.request(|reply| PlayerCommand::SetVolume(volume, reply))
            .await?
    }

    pub async fn request_fullscreen(&self) -> Result<PlayerStatus> {
        self.request(PlayerCommand::RequestFullscreen).await?
    }

    pub async fn resize(&self, geometry: SurfaceGeometry) -> Result<PlayerStatus> {
        self.request(|reply| PlayerCommand::Resize(geometry, reply))
            .await
    }

    pub async fn replace_overlays(&self, overlays: Vec<OverlayRecord>) -> Result<()> {
        self.send(PlayerCommand::ReplaceOverlays(overlays)).await
    }

    pub async fn overlay_changed(&self, change: OverlayChange) -> Result<()> {
        self.send(PlayerCommand::OverlayChanged(change)).await
    }

    pub async fn status(&self) -> Result<PlayerStatus> {
        self.request(PlayerCommand::Status).await
    }

    pub async fn frame(&self) -> Result<ComposedFrame> {
        self.request(PlayerCommand::Frame).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(PlayerCommand::Shutdown).await
    }
}

/// Application service owning the session controller and the compositor.
///
/// Runs as one task: session events, API commands and image check results
/// are handled strictly one at a time, so controller state needs no locking.
pub struct PlayerService<S: PlaybackSurface> {
    controller: SessionController<S>,
    compositor: OverlayCompositor,
    resolver: EndpointResolver,
    fetcher: Arc<dyn MediaFetcher>,
    locator: Option<String>,
}

impl<S: PlaybackSurface + 'static> PlayerService<S> {
    pub fn new(
        controller: SessionController<S>,
        compositor: OverlayCompositor,
        resolver: EndpointResolver,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            controller,
            compositor,
            resolver,
            fetcher,
            locator: None,
        }
    }

    /// Start the service task
    pub fn spawn(self, events: SessionEvents) -> (PlayerHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let checks = tx.downgrade();
        let task = tokio::spawn(self.run(events, commands, checks));
        (PlayerHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut events: SessionEvents,
        mut commands: mpsc::Receiver<PlayerCommand>,
        checks: mpsc::WeakSender<PlayerCommand>,
    ) {
        tracing::info!("Player service started");

        loop {
            tokio::select! {
                Some(envelope) = events.recv() => {
                    self.controller.handle_event(envelope);
                }
                command = commands.recv() => match command {
                    None | Some(PlayerCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
            }
            self.dispatch_image_checks(&checks);
        }

        self.controller.cleanup();
        tracing::info!("Player service stopped");
    }

    fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::ApplySettings(settings, reply) => {
                let result = self.apply_settings(settings).map(|_| self.controller.status());
                let _ = reply.send(result);
            }
            PlayerCommand::Retry(reply) => {
                let result = self.controller.retry().map(|_| self.controller.status());
                let _ = reply.send(result);
            }
            PlayerCommand::TogglePlay(reply) => {
                let result = self.controller.toggle_play().map(|_| self.controller.status());
                let _ = reply.send(result);
            }
            PlayerCommand::ToggleMute(reply) => {
                self.controller.toggle_mute();
                let _ = reply.send(self.controller.status());
            }
            PlayerCommand::SetVolume(volume, reply) => {
                let result = self
                    .controller
                    .set_volume(volume)
                    .map(|_| self.controller.status());
                let _ = reply.send(result);
            }
            PlayerCommand::RequestFullscreen(reply) => {
                let result = self.controller.request_fullscreen().map(|geometry| {
                    self.compositor.set_geometry(geometry);
                    self.controller.status()
                });
                let _ = reply.send(result);
            }
            PlayerCommand::Resize(geometry, reply) => {
                self.controller.surface_mut().resize(geometry);
                self.compositor
                    .set_geometry(self.controller.surface().geometry());
                let _ = reply.send(self.controller.status());
            }
            PlayerCommand::ReplaceOverlays(overlays) => {
                self.compositor.set_overlays(overlays);
            }
            PlayerCommand::OverlayChanged(change) => {
                self.compositor.apply_change(change);
            }
            PlayerCommand::ImageChecked {
                overlay_id,
                src,
                loaded,
            } => {
                self.compositor.report_image_result(&overlay_id, &src, loaded);
            }
            PlayerCommand::Status(reply) => {
                let _ = reply.send(self.controller.status());
            }
            PlayerCommand::Frame(reply) => {
                let _ = reply.send(self.compositor.frame().clone());
            }
            PlayerCommand::Shutdown => {}
        }
    }

    fn apply_settings(&mut self, settings: PlayerSettings) -> Result<()> {
        let options = SessionOptions::from_settings(&settings)?;
        self.controller.restore_volume(settings.volume)?;
        self.controller.set_options(options);

        let locator = settings.source_locator.trim();
        if self.locator.as_deref() == Some(locator) {
            return Ok(());
        }
        self.locator = Some(locator.to_string());

        if locator.is_empty() {
            tracing::info!("Source locator cleared, stopping playback");
            self.controller.cleanup();
            return Ok(());
        }

        match self.resolver.try_resolve(locator) {
            Ok(manifest_url) => {
                tracing::info!(locator, manifest_url = %manifest_url, "Source locator changed");
                self.controller.start(&manifest_url)?;
            }
            Err(e) => self.controller.fail_resolution(locator, &e),
        }
        Ok(())
    }

    fn dispatch_image_checks(&mut self, checks: &mpsc::WeakSender<PlayerCommand>) {
        for ImageRequest { overlay_id, src } in self.compositor.take_image_requests() {
            let Some(tx) = checks.upgrade() else {
                return;
            };
            let fetcher = self.fetcher.clone();

            tokio::spawn(async move {
                let loaded = match fetcher.fetch(&src).await {
                    Ok(body) => !body.is_empty(),
                    Err(e) => {
                        tracing::warn!(
                            overlay_id = %overlay_id,
                            src = %src,
                            error = %e,
                            "Image check failed"
                        );
                        false
                    }
                };
                let _ = tx
                    .send(PlayerCommand::ImageChecked {
                        overlay_id,
                        src,
                        loaded,
                    })
                    .await;
            });
        }
    }
}
