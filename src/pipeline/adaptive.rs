use std::time::Duration;

use crate::types::{AdaptiveConfig, PerformanceStats};

pub const MIN_CONFIDENCE_FLOOR: f32 = 0.3;
pub const MIN_CONFIDENCE_CEILING: f32 = 0.7;
pub const CONFIDENCE_STEP: f32 = 0.1;

const SLOW_FPS_RATIO: f32 = 0.8;
const FAST_FPS_RATIO: f32 = 1.1;
const SLOW_PROCESS_TIME: Duration = Duration::from_millis(30);
const FAST_PROCESS_TIME: Duration = Duration::from_millis(15);
const MAX_DROPPED_FRAMES: u32 = 10;
const HEADROOM_DROPPED_FRAMES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityAdjustment {
    Raised,
    Lowered,
    Unchanged,
}

/// Step controller that trades detection strictness for throughput.
///
/// Between the "too slow" and "headroom" bands nothing changes, so noisy
/// one-second FPS samples do not make the threshold oscillate.
#[derive(Clone, Debug)]
pub struct AdaptiveController {
    config: AdaptiveConfig,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config: AdaptiveConfig {
                min_confidence: clamp_confidence(config.min_confidence),
                ..config
            },
        }
    }

    pub fn config(&self) -> AdaptiveConfig {
        self.config
    }

    pub fn min_confidence(&self) -> f32 {
        self.config.min_confidence
    }

    pub fn update(&mut self, stats: &PerformanceStats) -> QualityAdjustment {
        if !self.config.enable_adaptive_quality {
            return QualityAdjustment::Unchanged;
        }

        let target = self.config.target_fps;
        let current = self.config.min_confidence;
        let next = if stats.current_fps < target * SLOW_FPS_RATIO
            || stats.avg_process_time > SLOW_PROCESS_TIME
            || stats.dropped_frames > MAX_DROPPED_FRAMES
        {
            clamp_confidence(step(current, CONFIDENCE_STEP))
        } else if stats.current_fps > target * FAST_FPS_RATIO
            && stats.avg_process_time < FAST_PROCESS_TIME
            && stats.dropped_frames < HEADROOM_DROPPED_FRAMES
        {
            clamp_confidence(step(current, -CONFIDENCE_STEP))
        } else {
            current
        };

        self.config.min_confidence = next;
        if next > current {
            QualityAdjustment::Raised
        } else if next < current {
            QualityAdjustment::Lowered
        } else {
            QualityAdjustment::Unchanged
        }
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new(AdaptiveConfig::default())
    }
}

/// Clamps to the allowed band. Non-finite values fall to the floor.
pub fn clamp_confidence(value: f32) -> f32 {
    if !value.is_finite() {
        return MIN_CONFIDENCE_FLOOR;
    }
    value.clamp(MIN_CONFIDENCE_FLOOR, MIN_CONFIDENCE_CEILING)
}

/// Moves by `delta`, rounded to three decimals so repeated steps do not drift.
fn step(current: f32, delta: f32) -> f32 {
    ((current + delta) * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn controller(min_confidence: f32) -> AdaptiveController {
        AdaptiveController::new(AdaptiveConfig {
            target_fps: 30.0,
            min_confidence,
            enable_adaptive_quality: true,
        })
    }

    fn stats(fps: f32, process_ms: u64, dropped: u32) -> PerformanceStats {
        PerformanceStats {
            current_fps: fps,
            avg_process_time: Duration::from_millis(process_ms),
            dropped_frames: dropped,
            ..Default::default()
        }
    }

    #[test]
    fn slow_window_raises_then_fast_window_lowers() {
        let mut ctl = controller(0.3);
        assert_eq!(ctl.update(&stats(20.0, 35, 0)), QualityAdjustment::Raised);
        assert_relative_eq!(ctl.min_confidence(), 0.4, epsilon = 1e-6);

        assert_eq!(ctl.update(&stats(40.0, 10, 1)), QualityAdjustment::Lowered);
        assert_relative_eq!(ctl.min_confidence(), 0.3, epsilon = 1e-6);
    }

    #[test]
    fn any_single_pressure_signal_raises() {
        let mut ctl = controller(0.5);
        assert_eq!(ctl.update(&stats(30.0, 31, 0)), QualityAdjustment::Raised);
        let mut ctl = controller(0.5);
        assert_eq!(ctl.update(&stats(30.0, 20, 11)), QualityAdjustment::Raised);
        let mut ctl = controller(0.5);
        assert_eq!(ctl.update(&stats(23.0, 20, 0)), QualityAdjustment::Raised);
    }

    #[test]
    fn hysteresis_band_holds_steady() {
        let mut ctl = controller(0.5);
        // Fast enough, but processing time is inside the band.
        assert_eq!(ctl.update(&stats(40.0, 20, 0)), QualityAdjustment::Unchanged);
        // On target, quick, few drops.
        assert_eq!(ctl.update(&stats(30.0, 10, 0)), QualityAdjustment::Unchanged);
        // Fast but three drops is not headroom.
        assert_eq!(ctl.update(&stats(40.0, 10, 3)), QualityAdjustment::Unchanged);
        assert_relative_eq!(ctl.min_confidence(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn threshold_never_leaves_band() {
        let mut ctl = controller(0.5);
        for _ in 0..20 {
            ctl.update(&stats(5.0, 100, 50));
            assert!(ctl.min_confidence() <= MIN_CONFIDENCE_CEILING);
        }
        assert_relative_eq!(ctl.min_confidence(), 0.7, epsilon = 1e-6);
        assert_eq!(ctl.update(&stats(5.0, 100, 50)), QualityAdjustment::Unchanged);

        for _ in 0..20 {
            ctl.update(&stats(120.0, 1, 0));
            assert!(ctl.min_confidence() >= MIN_CONFIDENCE_FLOOR);
        }
        assert_relative_eq!(ctl.min_confidence(), 0.3, epsilon = 1e-6);
    }

    #[test]
    fn disabled_controller_never_moves() {
        let mut ctl = AdaptiveController::new(AdaptiveConfig {
            enable_adaptive_quality: false,
            ..AdaptiveConfig::default()
        });
        assert_eq!(ctl.update(&stats(1.0, 500, 100)), QualityAdjustment::Unchanged);
        assert_relative_eq!(ctl.min_confidence(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn configured_threshold_is_kept_off_grid() {
        let mut ctl = controller(0.45);
        assert_eq!(ctl.min_confidence(), 0.45);

        assert_eq!(ctl.update(&stats(20.0, 35, 0)), QualityAdjustment::Raised);
        assert_eq!(ctl.min_confidence(), 0.55);
        assert_eq!(ctl.update(&stats(40.0, 10, 0)), QualityAdjustment::Lowered);
        assert_eq!(ctl.min_confidence(), 0.45);

        // Clamping at the edges still applies to off-grid values.
        let mut ctl = controller(0.65);
        assert_eq!(ctl.update(&stats(20.0, 35, 0)), QualityAdjustment::Raised);
        assert_eq!(ctl.min_confidence(), MIN_CONFIDENCE_CEILING);
    }

    #[test]
    fn round_trips_stay_on_the_configured_values() {
        let mut ctl = controller(0.3);
        for _ in 0..4 {
            ctl.update(&stats(20.0, 35, 0));
        }
        assert_eq!(ctl.min_confidence(), 0.7);
        for _ in 0..4 {
            ctl.update(&stats(40.0, 10, 0));
        }
        assert_eq!(ctl.min_confidence(), 0.3);
    }

    #[test]
    fn initial_threshold_is_clamped() {
        assert_relative_eq!(controller(0.95).min_confidence(), 0.7, epsilon = 1e-6);
        assert_relative_eq!(controller(0.0).min_confidence(), 0.3, epsilon = 1e-6);
        assert_relative_eq!(controller(f32::NAN).min_confidence(), 0.3, epsilon = 1e-6);
    }
}
