use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{render::Color, Result, VisualizerError};

/// Top-level configuration structure for the visualiser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub capture: CaptureConfig,
    pub animation: AnimationConfig,
    pub render: RenderConfig,
    pub progress: ProgressConfig,
    pub recording: RecordingConfig,
}

impl VisualizerConfig {
    /// Reads a JSON configuration file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let size = self.capture.capture_size;
        if size == 0 || !size.is_power_of_two() {
            return Err(VisualizerError::CaptureSize(size));
        }
        if self.animation.duration_ms == 0 {
            return Err(VisualizerError::Config("animation duration must be positive".into()));
        }
        if self.animation.max_points == 0 {
            return Err(VisualizerError::Config("animation needs at least one point".into()));
        }
        for (name, value) in [
            ("animation.tick_interval_ms", self.animation.tick_interval_ms),
            ("animation.rotation_period_ms", self.animation.rotation_period_ms),
            ("render.refresh_interval_ms", self.render.refresh_interval_ms),
            ("progress.interval_ms", self.progress.interval_ms),
        ] {
            if value == 0 {
                return Err(VisualizerError::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// Settings for the audio-session tap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Samples per delivery; must be a power of two.
    pub capture_size: usize,
    /// Requested delivery rate in millihertz, capped by the platform maximum.
    pub rate_hint_millihertz: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_size: 512,
            rate_hint_millihertz: u32::MAX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Length of the ease-out interpolation started by each capture frame.
    pub duration_ms: u64,
    pub tick_interval_ms: u64,
    /// Time for one full turn of the circular waveform.
    pub rotation_period_ms: u64,
    /// Capacity of the animated waveform and spectrum buffers.
    pub max_points: usize,
}

impl AnimationConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn rotation_period(&self) -> Duration {
        Duration::from_millis(self.rotation_period_ms)
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            duration_ms: 150,
            tick_interval_ms: 16,
            rotation_period_ms: 10_000,
            max_points: 128,
        }
    }
}

/// Geometry, tuning constants and palette used by the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub circle_points: usize,
    pub circle_floor: f32,
    pub circle_gain: f32,
    pub amplitude_divisor: f32,
    pub spectrum_exponent: f32,
    pub bar_width: f32,
    pub bar_space: f32,
    pub bar_max_points: usize,
    pub bar_corner_radius: f32,
    pub stroke_width: f32,
    pub background_radius_factor: f32,
    pub waveform_colors: (Color, Color),
    pub spectrum_colors: (Color, Color),
    pub background_colors: Vec<Color>,
    pub refresh_interval_ms: u64,
}

impl RenderConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            circle_points: 64,
            circle_floor: 0.3,
            circle_gain: 0.7,
            amplitude_divisor: 128.0,
            spectrum_exponent: 1.5,
            bar_width: 4.0,
            bar_space: 1.0,
            bar_max_points: 128,
            bar_corner_radius: 3.0,
            stroke_width: 3.0,
            background_radius_factor: 0.8,
            waveform_colors: (Color::rgb(0x4C, 0xAF, 0x50), Color::rgb(0x00, 0xBC, 0xD4)),
            spectrum_colors: (Color::rgb(0xFF, 0x57, 0x22), Color::rgb(0xFF, 0xEB, 0x3B)),
            background_colors: vec![
                Color::rgb(0x00, 0x57, 0x4B),
                Color::rgb(0x00, 0x38, 0x40),
                Color::rgb(0x00, 0x20, 0x30),
            ],
            refresh_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub interval_ms: u64,
}

impl ProgressConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

/// Where and whether raw waveform bytes are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub enabled: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            enabled: true,
        }
    }
}
