use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "platform::pid_file_path")]
    pub pid_file: PathBuf,
    #[serde(default = "platform::control_socket_path")]
    pub control_socket: PathBuf,
    #[serde(default = "platform::snapshot_path")]
    pub snapshot_file: PathBuf,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    /// Start the current station as soon as the daemon is up.
    #[serde(default = "default_true")]
    pub autoplay: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// The external program that turns a station URL into audio.  The URL is
/// appended as the last argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_decoder_program")]
    pub program: String,
    #[serde(default = "default_decoder_args")]
    pub args: Vec<String>,
    /// Grace period between SIGTERM and SIGKILL.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    #[serde(default = "platform::playlist_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    /// Percent per encoder detent.
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    #[serde(default = "default_true")]
    pub mixer_enabled: bool,
    #[serde(default = "default_mixer_program")]
    pub mixer_program: String,
    #[serde(default = "default_mixer_control")]
    pub mixer_control: String,
    /// A mixer call still running after this is killed and reported as failed.
    #[serde(default = "default_mixer_timeout_ms")]
    pub mixer_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Line-oriented event feed (usually a FIFO written by a GPIO helper).
    /// The hardware adapter is off when unset.
    #[serde(default)]
    pub event_source: Option<PathBuf>,
    /// Two presses closer together than this toggle play/pause.
    #[serde(default = "default_double_click_ms")]
    pub double_click_ms: u64,
}

impl DecoderConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl AudioConfig {
    pub fn mixer_timeout(&self) -> Duration {
        Duration::from_millis(self.mixer_timeout_ms)
    }
}

impl DaemonConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }
}

impl HardwareConfig {
    pub fn double_click_window(&self) -> Duration {
        Duration::from_millis(self.double_click_ms)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: platform::pid_file_path(),
            control_socket: platform::control_socket_path(),
            snapshot_file: platform::snapshot_path(),
            snapshot_interval_secs: default_snapshot_interval(),
            autoplay: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: default_decoder_program(),
            args: default_decoder_args(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            path: platform::playlist_path(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            volume_step: default_volume_step(),
            mixer_enabled: true,
            mixer_program: default_mixer_program(),
            mixer_control: default_mixer_control(),
            mixer_timeout_ms: default_mixer_timeout_ms(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            event_source: None,
            double_click_ms: default_double_click_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_snapshot_interval() -> u64 {
    20
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    platform::DEFAULT_HTTP_PORT
}

fn default_decoder_program() -> String {
    "mpg123".to_string()
}

fn default_decoder_args() -> Vec<String> {
    vec!["-v".to_string()]
}

fn default_stop_timeout_ms() -> u64 {
    3000
}

fn default_volume() -> u8 {
    50
}

fn default_volume_step() -> u8 {
    5
}

fn default_mixer_program() -> String {
    "amixer".to_string()
}

fn default_mixer_control() -> String {
    "Master".to_string()
}

fn default_mixer_timeout_ms() -> u64 {
    2000
}

fn default_double_click_ms() -> u64 {
    500
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
