use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    pipeline::{
        adaptive::{MIN_CONFIDENCE_CEILING, MIN_CONFIDENCE_FLOOR},
        consumer::LandmarkSmoother,
        processor::ProcessorOptions,
    },
    types::AdaptiveConfig,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub processor: ProcessorSection,
    #[serde(default)]
    pub adaptive: AdaptiveSection,
    #[serde(default)]
    pub consumer: ConsumerSection,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProcessorSection {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_stats_window_ms")]
    pub stats_window_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AdaptiveSection {
    #[serde(default = "default_target_fps")]
    pub target_fps: f32,
    /// Starting threshold; snapped into the adaptive range.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConsumerSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_display_threshold")]
    pub display_threshold: f32,
    /// Weight of the newest position in the display average.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
}

fn default_tick_interval_ms() -> u64 { 16 }
fn default_stats_window_ms() -> u64 { 1000 }
fn default_target_fps() -> f32 { 30.0 }
fn default_min_confidence() -> f32 { 0.5 }
fn default_enabled() -> bool { true }
fn default_poll_interval_ms() -> u64 { 33 }
fn default_display_threshold() -> f32 { 0.5 }
fn default_smoothing() -> f32 { 0.7 }

impl Default for ProcessorSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stats_window_ms: default_stats_window_ms(),
        }
    }
}

impl Default for AdaptiveSection {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            min_confidence: default_min_confidence(),
            enabled: default_enabled(),
        }
    }
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            display_threshold: default_display_threshold(),
            smoothing: default_smoothing(),
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processor.tick_interval_ms == 0 {
            return Err(invalid("processor.tick_interval_ms", "must be positive"));
        }
        if self.processor.stats_window_ms == 0 {
            return Err(invalid("processor.stats_window_ms", "must be positive"));
        }
        if !(self.adaptive.target_fps.is_finite() && self.adaptive.target_fps > 0.0) {
            return Err(invalid(
                "adaptive.target_fps",
                format!("expected a positive number, got {}", self.adaptive.target_fps),
            ));
        }
        if !(MIN_CONFIDENCE_FLOOR..=MIN_CONFIDENCE_CEILING).contains(&self.adaptive.min_confidence)
        {
            return Err(invalid(
                "adaptive.min_confidence",
                format!(
                    "expected {MIN_CONFIDENCE_FLOOR}..={MIN_CONFIDENCE_CEILING}, got {}",
                    self.adaptive.min_confidence
                ),
            ));
        }
        if self.consumer.poll_interval_ms == 0 {
            return Err(invalid("consumer.poll_interval_ms", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.consumer.display_threshold) {
            return Err(invalid("consumer.display_threshold", "expected 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.consumer.smoothing) {
            return Err(invalid("consumer.smoothing", "expected 0..=1"));
        }
        Ok(())
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            tick_interval: Duration::from_millis(self.processor.tick_interval_ms),
            stats_window: Duration::from_millis(self.processor.stats_window_ms),
            adaptive: AdaptiveConfig {
                target_fps: self.adaptive.target_fps,
                min_confidence: self.adaptive.min_confidence,
                enable_adaptive_quality: self.adaptive.enabled,
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.consumer.poll_interval_ms)
    }

    pub fn smoother(&self) -> LandmarkSmoother {
        LandmarkSmoother::new(self.consumer.smoothing, self.consumer.display_threshold)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
