use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::services::{EndpointResolver, DEFAULT_HLS_PORT, DEFAULT_PLAYLIST_NAME};
use crate::domain::value_objects::{BackoffPolicy, SurfaceGeometry};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "overlay-player",
    version,
    about = "Live HLS player with composited overlays"
)]
pub struct Config {
    /// HTTP API port
    #[arg(long, env = "API_PORT", default_value = "3001")]
    pub api_port: u16,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9003")]
    pub metrics_port: u16,

    /// Source locator used when the store has none (rtsp://host/stream or a .m3u8 URL)
    #[arg(long, env = "SOURCE_LOCATOR")]
    pub source_locator: Option<String>,

    /// HLS output port of the media server
    #[arg(long, env = "HLS_PORT", default_value_t = DEFAULT_HLS_PORT)]
    pub media_host_port: u16,

    /// URL scheme of the media server's HLS output
    #[arg(long, env = "MEDIA_SCHEME", default_value = "http")]
    pub media_scheme: String,

    /// Playlist file name under each stream path
    #[arg(long, env = "MEDIA_PLAYLIST", default_value = DEFAULT_PLAYLIST_NAME)]
    pub media_playlist: String,

    /// JSON file persisting overlays and settings (in-memory when unset)
    #[arg(long, env = "DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Initial surface width in pixels
    #[arg(long, default_value = "1280")]
    pub surface_width: u32,

    /// Initial surface height in pixels
    #[arg(long, default_value = "720")]
    pub surface_height: u32,

    /// Initial delay before retrying a failed fetch, in milliseconds
    #[arg(long, env = "RECONNECT_INITIAL_MS", default_value = "1000")]
    pub reconnect_initial_ms: u64,

    /// Upper bound for the retry delay, in milliseconds
    #[arg(long, env = "RECONNECT_MAX_MS", default_value = "8000")]
    pub reconnect_max_ms: u64,

    /// Growth factor of the retry delay
    #[arg(long, env = "RECONNECT_MULTIPLIER", default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        Self::validate_port(self.api_port, "API")?;
        Self::validate_port(self.metrics_port, "metrics")?;

        if self.api_port == self.metrics_port {
            anyhow::bail!("API port and metrics port cannot be the same");
        }

        if self.media_host_port == 0 {
            anyhow::bail!("Invalid media host port: port cannot be 0");
        }

        if !matches!(self.media_scheme.as_str(), "http" | "https") {
            anyhow::bail!("Media scheme must be http or https, got {}", self.media_scheme);
        }

        if self.media_playlist.is_empty() || self.media_playlist.contains('/') {
            anyhow::bail!("Invalid media playlist name: {:?}", self.media_playlist);
        }

        if self.surface_width == 0 || self.surface_height == 0 {
            anyhow::bail!(
                "Surface dimensions must be positive: {}x{}",
                self.surface_width,
                self.surface_height
            );
        }

        if self.reconnect_initial_ms == 0 {
            anyhow::bail!("Reconnect initial delay cannot be 0");
        }

        if self.reconnect_max_ms < self.reconnect_initial_ms {
            anyhow::bail!(
                "Reconnect max delay ({}ms) must be >= initial delay ({}ms)",
                self.reconnect_max_ms,
                self.reconnect_initial_ms
            );
        }

        if self.reconnect_multiplier <= 1.0 {
            anyhow::bail!(
                "Reconnect multiplier must be > 1.0, got {}",
                self.reconnect_multiplier
            );
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> anyhow::Result<BackoffPolicy> {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
            self.reconnect_multiplier,
        )
        .map_err(|e| anyhow::anyhow!("{}", e))
    }

    pub fn resolver(&self) -> EndpointResolver {
        EndpointResolver::new(self.media_host_port)
            .with_scheme(self.media_scheme.as_str())
            .with_playlist_name(self.media_playlist.as_str())
    }

    pub fn surface_geometry(&self) -> SurfaceGeometry {
        SurfaceGeometry::new(self.surface_width, self.surface_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["overlay-player"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.api_port, 3001);
        assert_eq!(config.media_host_port, 8888);
        assert_eq!(config.resolver().hls_port(), 8888);
        assert_eq!(
            config.resolver().resolve("rtsp://cam/lobby"),
            "http://cam:8888/lobby/index.m3u8"
        );
    }

    #[test]
    fn test_media_scheme_and_playlist_shape_resolved_urls() {
        let config = parse(&["--media-scheme", "https", "--media-playlist", "live.m3u8"]);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.resolver().resolve("rtsp://cam/lobby"),
            "https://cam:8888/lobby/live.m3u8"
        );

        assert!(parse(&["--media-scheme", "ftp"]).validate().is_err());
        assert!(parse(&["--media-playlist", "a/b.m3u8"]).validate().is_err());
    }

    #[test]
    fn test_privileged_port_is_rejected() {
        let config = parse(&["--api-port", "80"]);
        let error = config.validate().unwrap_err().to_string();
        assert!(error.contains("privileged"));
    }

    #[test]
    fn test_duplicate_ports_are_rejected() {
        let config = parse(&["--api-port", "9003"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_bounds() {
        assert!(parse(&["--reconnect-multiplier", "1.0"]).validate().is_err());
        assert!(parse(&["--reconnect-initial-ms", "0"]).validate().is_err());
        assert!(parse(&["--reconnect-max-ms", "10", "--reconnect-initial-ms", "20"])
            .validate()
            .is_err());

        let policy = parse(&["--reconnect-initial-ms", "250"]).backoff_policy().unwrap();
        assert_eq!(policy.initial_delay(), Duration::from_millis(250));
    }
}
