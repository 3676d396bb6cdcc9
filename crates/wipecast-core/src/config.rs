use serde::{Deserialize, Serialize};

use crate::boundary::{BoundaryPosition, RevealSide};
use crate::error::{WipecastError, WipecastResult};
use crate::format::ContainerFormat;
use crate::Color;

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "wipecast.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Hex color the canvas is cleared to before each frame.
    pub background: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            background: "#000000".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn background_color(&self) -> WipecastResult<Color> {
        Color::from_hex(&self.background)
            .map_err(|e| WipecastError::Config(format!("output.background: {}", e)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WipeConfig {
    pub duration_secs: f64,
    pub hold_fraction: f64,
    pub wipe_fraction: f64,
    pub from: BoundaryPosition,
    pub to: BoundaryPosition,
}

impl Default for WipeConfig {
    fn default() -> Self {
        Self {
            duration_secs: 5.0,
            hold_fraction: 0.2,
            wipe_fraction: 0.6,
            from: BoundaryPosition::MAX,
            to: BoundaryPosition::MIN,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Container preference order; the first one available at runtime wins.
    pub formats: Vec<ContainerFormat>,
    /// Override the encoder's default quality.
    pub crf: Option<u32>,
    pub ffmpeg_path: String,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            formats: vec![ContainerFormat::Webm, ContainerFormat::Mp4],
            crf: None,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_image_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ComparatorConfig {
    pub reveal: RevealSide,
    pub initial_position: BoundaryPosition,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub summary_model: String,
    pub highlight_model: String,
    pub video_model: String,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            summary_model: "gemini-2.5-flash".to_string(),
            highlight_model: "gemini-2.5-flash-image-preview".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            poll_interval_secs: 5,
            max_poll_attempts: 120,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: ".wipecast/store".to_string(),
        }
    }
}

/// Top-level `wipecast.toml`. Every section is optional.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WipecastConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub wipe: WipeConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub comparator: ComparatorConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl WipecastConfig {
    pub fn load_from_file(path: &std::path::Path) -> WipecastResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
            .map_err(|e| WipecastError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(contents: &str) -> WipecastResult<Self> {
        let config: WipecastConfig =
            toml::from_str(contents).map_err(|e| WipecastError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> WipecastResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| WipecastError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings no session could run with.
    pub fn validate(&self) -> WipecastResult<()> {
        let out = &self.output;
        if out.width == 0 || out.height == 0 {
            return Err(WipecastError::Config(format!(
                "output size must be non-zero, got {}x{}",
                out.width, out.height
            )));
        }
        if out.fps == 0 {
            return Err(WipecastError::Config("output.fps must be at least 1".into()));
        }
        out.background_color()?;

        let wipe = &self.wipe;
        if !(wipe.duration_secs.is_finite() && wipe.duration_secs > 0.0) {
            return Err(WipecastError::Config(
                "wipe.duration_secs must be a positive number".into(),
            ));
        }
        let fractions_ok = (0.0..=1.0).contains(&wipe.hold_fraction)
            && (0.0..=1.0).contains(&wipe.wipe_fraction)
            && wipe.hold_fraction + wipe.wipe_fraction <= 1.0;
        if !fractions_ok {
            return Err(WipecastError::Config(format!(
                "wipe fractions must lie in [0, 1] and sum to at most 1 (hold {}, wipe {})",
                wipe.hold_fraction, wipe.wipe_fraction
            )));
        }

        if self.encode.formats.is_empty() {
            return Err(WipecastError::Config(
                "encode.formats must list at least one container".into(),
            ));
        }
        if self.upload.max_image_bytes == 0 {
            return Err(WipecastError::Config(
                "upload.max_image_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Number of frames in a scripted recording.
    pub fn frame_count(&self) -> u32 {
        (self.wipe.duration_secs * self.output.fps as f64).round() as u32
    }
}
