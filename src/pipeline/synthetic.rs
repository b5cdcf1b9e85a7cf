use std::{thread, time::Duration};

use rayon::prelude::*;

use super::engine::{DetectionEngine, EngineError, EngineOutput};
use crate::types::{Frame, Landmark, POSE_LANDMARK_COUNT};

/// Standing figure in normalized image coordinates, indexed like
/// [`crate::types::PoseLandmark`].
const TEMPLATE: [(f32, f32); POSE_LANDMARK_COUNT] = [
    (0.50, 0.14),
    (0.49, 0.12),
    (0.48, 0.12),
    (0.47, 0.12),
    (0.51, 0.12),
    (0.52, 0.12),
    (0.53, 0.12),
    (0.45, 0.13),
    (0.55, 0.13),
    (0.49, 0.16),
    (0.51, 0.16),
    (0.42, 0.25),
    (0.58, 0.25),
    (0.38, 0.37),
    (0.62, 0.37),
    (0.36, 0.48),
    (0.64, 0.48),
    (0.35, 0.51),
    (0.65, 0.51),
    (0.36, 0.52),
    (0.64, 0.52),
    (0.37, 0.50),
    (0.63, 0.50),
    (0.45, 0.52),
    (0.55, 0.52),
    (0.45, 0.70),
    (0.55, 0.70),
    (0.45, 0.87),
    (0.55, 0.87),
    (0.44, 0.90),
    (0.56, 0.90),
    (0.47, 0.92),
    (0.53, 0.92),
];

/// Stand-in pose detector driven by frame brightness.
///
/// Dark frames produce no pose; brighter frames produce a swaying skeleton
/// whose visibility follows the brightness. Poses scoring under the current
/// minimum confidence are not reported.
#[derive(Clone, Debug)]
pub struct SyntheticPoseEngine {
    latency: Duration,
    min_brightness: f32,
    min_confidence: f32,
}

impl SyntheticPoseEngine {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            min_brightness: 16.0,
            min_confidence: 0.5,
        }
    }

    /// Simulates the cost of a real model.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for SyntheticPoseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionEngine for SyntheticPoseEngine {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_micros: i64,
    ) -> Result<EngineOutput, EngineError> {
        if !frame.is_well_formed() {
            return Err(EngineError::Failed(format!(
                "frame buffer size mismatch: got {}, expected {}",
                frame.rgba.len(),
                frame.expected_len()
            )));
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let brightness = average_brightness(frame);
        if brightness < self.min_brightness {
            return Ok(EngineOutput::empty());
        }

        // Mid-grey frames already read as a confident pose.
        let score = (brightness / 255.0).clamp(0.0, 1.0).sqrt();
        if score < self.min_confidence {
            return Ok(EngineOutput::empty());
        }
        let phase = (timestamp_micros as f64 / 1_000_000.0 * std::f64::consts::TAU) as f32;
        let sway = phase.sin() * 0.02;
        let landmarks = TEMPLATE
            .iter()
            .enumerate()
            .map(|(index, &(x, y))| {
                // Limbs swing more than the torso.
                let reach = if index >= 13 { 1.5 } else { 1.0 };
                Landmark {
                    x: (x + sway * reach).clamp(0.0, 1.0),
                    y,
                    z: (index as f32 / POSE_LANDMARK_COUNT as f32 - 0.5) * 0.2,
                    visibility: (score * (1.0 - 0.01 * (index % 5) as f32)).clamp(0.0, 1.0),
                    index,
                }
            })
            .collect();

        Ok(EngineOutput::pose(landmarks, score))
    }

    fn set_min_confidence(&mut self, min_confidence: f32) {
        self.min_confidence = min_confidence;
    }
}

fn average_brightness(frame: &Frame) -> f32 {
    let pixels = (frame.rgba.len() / 4).max(1);
    let total: f32 = frame
        .rgba
        .par_chunks_exact(4)
        .map(|px| (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0)
        .sum();
    total / pixels as f32
}
