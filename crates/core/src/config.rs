//! Viewer configuration
//!
//! Every tunable of the viewer lives in [`ViewerConfig`]. Configuration can
//! be loaded from a TOML file, from `SIGNVIEW_*` environment variables, or
//! built programmatically. Missing keys fall back to the defaults.

use crate::gesture::GestureConfig;
use crate::placement::PlacementConfig;
use serde::{Deserialize, Serialize};
use signview_render::{OverlayStyle, PipelineConfig};
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for a [`SignatureViewer`](crate::SignatureViewer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Rendered rasters kept per surface
    pub cache_capacity: usize,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Device pixel ratios above this are capped
    pub max_device_pixel_ratio: f32,
    /// Hard limit for a single page render
    pub render_timeout_secs: u64,
    /// Smallest selection kept after drawing, in screen pixels
    pub min_selection_px: f64,
    /// Distance from a corner or edge midpoint that grabs a resize handle
    pub handle_hit_radius_px: f64,
    pub swipe_min_distance_px: f64,
    pub swipe_max_off_axis_px: f64,
    pub swipe_max_duration_ms: u64,
    pub double_tap_window_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 5,
            min_scale: 0.5,
            max_scale: 3.0,
            max_device_pixel_ratio: 2.5,
            render_timeout_secs: 30,
            min_selection_px: 16.0,
            handle_hit_radius_px: 8.0,
            swipe_min_distance_px: 50.0,
            swipe_max_off_axis_px: 50.0,
            swipe_max_duration_ms: 300,
            double_tap_window_ms: 300,
        }
    }
}

impl ViewerConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_scale_range(mut self, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    pub fn with_max_device_pixel_ratio(mut self, ratio: f32) -> Self {
        self.max_device_pixel_ratio = ratio;
        self
    }

    pub fn with_render_timeout_secs(mut self, secs: u64) -> Self {
        self.render_timeout_secs = secs;
        self
    }

    pub fn with_min_selection_px(mut self, px: f64) -> Self {
        self.min_selection_px = px;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Each field can be overridden by the upper-cased field name with a
    /// `SIGNVIEW_` prefix, e.g. `SIGNVIEW_CACHE_CAPACITY` or
    /// `SIGNVIEW_RENDER_TIMEOUT_SECS`. Unset variables keep their default.
    ///
    /// # Errors
    /// Returns an error if a variable does not parse or the result fails
    /// validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        env_override("SIGNVIEW_CACHE_CAPACITY", &mut config.cache_capacity)?;
        env_override("SIGNVIEW_MIN_SCALE", &mut config.min_scale)?;
        env_override("SIGNVIEW_MAX_SCALE", &mut config.max_scale)?;
        env_override(
            "SIGNVIEW_MAX_DEVICE_PIXEL_RATIO",
            &mut config.max_device_pixel_ratio,
        )?;
        env_override("SIGNVIEW_RENDER_TIMEOUT_SECS", &mut config.render_timeout_secs)?;
        env_override("SIGNVIEW_MIN_SELECTION_PX", &mut config.min_selection_px)?;
        env_override("SIGNVIEW_HANDLE_HIT_RADIUS_PX", &mut config.handle_hit_radius_px)?;
        env_override("SIGNVIEW_SWIPE_MIN_DISTANCE_PX", &mut config.swipe_min_distance_px)?;
        env_override("SIGNVIEW_SWIPE_MAX_OFF_AXIS_PX", &mut config.swipe_max_off_axis_px)?;
        env_override("SIGNVIEW_SWIPE_MAX_DURATION_MS", &mut config.swipe_max_duration_ms)?;
        env_override("SIGNVIEW_DOUBLE_TAP_WINDOW_MS", &mut config.double_tap_window_ms)?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// ```toml
    /// cache_capacity = 8
    /// min_scale = 0.5
    /// max_scale = 4.0
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses and validates a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = format!("# Signview viewer configuration\n{}", self.to_toml()?);
        fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Reject combinations the viewer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_scale.is_finite() && self.min_scale > 0.0) {
            return Err(invalid("min_scale", self.min_scale));
        }
        if !self.max_scale.is_finite() || self.max_scale < self.min_scale {
            return Err(invalid("max_scale", self.max_scale));
        }
        if !(self.max_device_pixel_ratio.is_finite() && self.max_device_pixel_ratio > 0.0) {
            return Err(invalid("max_device_pixel_ratio", self.max_device_pixel_ratio));
        }
        if self.render_timeout_secs == 0 {
            return Err(invalid("render_timeout_secs", self.render_timeout_secs));
        }
        for (key, value) in [
            ("min_selection_px", self.min_selection_px),
            ("handle_hit_radius_px", self.handle_hit_radius_px),
            ("swipe_min_distance_px", self.swipe_min_distance_px),
            ("swipe_max_off_axis_px", self.swipe_max_off_axis_px),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(key, value));
            }
        }
        Ok(())
    }

    /// Clamp a logical scale into `[min_scale, max_scale]`
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        self.pipeline_config().clamp_scale(scale)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            max_device_pixel_ratio: self.max_device_pixel_ratio,
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            cache_capacity: self.cache_capacity,
            overlay_style: OverlayStyle::default(),
        }
    }

    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            swipe_min_distance: self.swipe_min_distance_px,
            swipe_max_off_axis: self.swipe_max_off_axis_px,
            swipe_max_duration: Duration::from_millis(self.swipe_max_duration_ms),
            double_tap_window: Duration::from_millis(self.double_tap_window_ms),
        }
    }

    pub fn placement_config(&self) -> PlacementConfig {
        PlacementConfig {
            min_size: self.min_selection_px,
            handle_hit_radius: self.handle_hit_radius_px,
        }
    }
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = env::var(key) {
        *slot = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Errors that can occur while loading or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
