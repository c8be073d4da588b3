use anyhow::{Context, Result};
use directories::ProjectDirs;
use hatrs_vision::pipeline::DetectorSettings;
use hatrs_vision::OverlayConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Compile-time override, then the per-user config dir, then a system path.
pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("HATRS_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    ProjectDirs::from("", "", "hatrs")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("/usr/local/etc/hatrs/config.toml"))
});

pub static SHARE_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("HATRS_SHARE_PREFIX").unwrap_or("/usr/local/share/hatrs"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    /// RGBA image drawn over each face
    pub hat: PathBuf,
    pub detector: DetectorConfig,
    pub overlay: OverlayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            hat: SHARE_PREFIX.join("santa-hat.png"),
            detector: DetectorConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Minimum time between two detector runs
    pub min_interval_ms: u64,
    pub tracking: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let settings = DetectorSettings::default();
        Self {
            model: SHARE_PREFIX.join("face_detection_yunet_2023mar.onnx"),
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            min_interval_ms: 100,
            tracking: settings.tracking,
        }
    }
}

impl DetectorConfig {
    pub fn settings(&self) -> DetectorSettings {
        DetectorSettings {
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
            tracking: self.tracking,
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
