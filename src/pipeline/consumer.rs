use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use super::{engine::DetectionEngine, processor::FrameProcessor, source::FrameSource};
use crate::types::{DetectionResult, Landmark, POSE_LANDMARK_COUNT};

pub const DEFAULT_DISPLAY_THRESHOLD: f32 = 0.5;
pub const DEFAULT_SMOOTHING: f32 = 0.7;

/// Anything that can hand out the most recent detection without blocking.
pub trait LatestResult: Send + Sync + 'static {
    fn latest(&self) -> Arc<DetectionResult>;
}

impl<S: FrameSource, E: DetectionEngine> LatestResult for FrameProcessor<S, E> {
    fn latest(&self) -> Arc<DetectionResult> {
        FrameProcessor::latest(self)
    }
}

/// Per-landmark exponential moving average for display.
///
/// `alpha` is the weight of the new position. Landmarks below the display
/// threshold are neither shown nor folded into the average, and a result
/// without a detection wipes all history.
#[derive(Clone, Debug)]
pub struct LandmarkSmoother {
    alpha: f32,
    display_threshold: f32,
    slots: Vec<Option<Landmark>>,
}

impl LandmarkSmoother {
    pub fn new(alpha: f32, display_threshold: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            display_threshold,
            slots: vec![None; POSE_LANDMARK_COUNT],
        }
    }

    pub fn apply(&mut self, result: &DetectionResult) -> Vec<Landmark> {
        if !result.detected {
            self.reset();
            return Vec::new();
        }

        let a = self.alpha;
        let mut visible = Vec::with_capacity(result.landmarks.len());
        for landmark in &result.landmarks {
            if !landmark.is_visible(self.display_threshold) {
                continue;
            }
            let Some(slot) = self.slots.get_mut(landmark.index) else {
                continue;
            };

            let smoothed = match slot {
                Some(prev) => Landmark {
                    x: a * landmark.x + (1.0 - a) * prev.x,
                    y: a * landmark.y + (1.0 - a) * prev.y,
                    z: a * landmark.z + (1.0 - a) * prev.z,
                    ..*landmark
                },
                None => *landmark,
            };
            *slot = Some(smoothed);
            visible.push(smoothed);
        }
        visible
    }

    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

impl Default for LandmarkSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING, DEFAULT_DISPLAY_THRESHOLD)
    }
}

#[derive(Debug)]
pub struct ResultPoller {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ResultPoller {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("result poller thread panicked");
            }
        }
    }
}

impl Drop for ResultPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reads the latest result every `interval`, independent of the processor's
/// own cadence, and hands it to `on_result`.
pub fn start_result_poller<P, F>(
    processor: Arc<P>,
    interval: Duration,
    mut on_result: F,
) -> io::Result<ResultPoller>
where
    P: LatestResult + ?Sized,
    F: FnMut(Arc<DetectionResult>) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::Builder::new()
        .name("pose-result-poller".into())
        .spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                let deadline = Instant::now() + interval;
                on_result(processor.latest());

                while !stop_flag.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::park_timeout(deadline - now);
                }
            }
        })?;

    Ok(ResultPoller {
        stop,
        handle: Some(handle),
    })
}
