use std::{
    io,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use super::{
    adaptive::{AdaptiveController, QualityAdjustment},
    clock::{Clock, SystemClock},
    engine::{DetectionEngine, EngineError, EngineOutput},
    source::FrameSource,
};
use crate::types::{AdaptiveConfig, DetectionResult, POSE_LANDMARK_COUNT, PerformanceStats};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessorOptions {
    /// Drive loop cadence; 16 ms tracks a 60 Hz display.
    pub tick_interval: Duration,
    pub stats_window: Duration,
    pub adaptive: AdaptiveConfig,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            stats_window: Duration::from_secs(1),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A detection was already in flight.
    Dropped,
    SourceNotReady,
    EngineNotReady,
    Completed { detected: bool },
    Failed,
    /// The processor was stopped while the detection ran.
    Discarded,
}

/// Drives capture -> detect -> cache with at most one detection in flight.
///
/// The latest result lives in a one-slot cache that every completed detection
/// overwrites. Readers never wait for a running detection.
///
/// The built-in drive loop detects synchronously, so it never overlaps itself.
/// Its dropped-frame count comes from frames the source passed over (see
/// [`FrameSource::take_skipped`]); `Dropped` ticks only happen when callers
/// tick from other threads.
pub struct FrameProcessor<S, E> {
    shared: Arc<Shared<S, E>>,
    driver: Mutex<Option<Driver>>,
}

struct Driver {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Driver {
    fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        self.handle.thread().unpark();
        if self.handle.join().is_err() {
            log::error!("frame processor thread panicked");
        }
    }
}

struct Shared<S, E> {
    source: Mutex<S>,
    engine: Mutex<E>,
    clock: Arc<dyn Clock>,
    options: ProcessorOptions,
    latest: RwLock<Arc<DetectionResult>>,
    stats: Mutex<StatsWindow>,
    controller: Mutex<AdaptiveController>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    last_timestamp: AtomicI64,
}

#[derive(Default)]
struct StatsWindow {
    stats: PerformanceStats,
    started_at: Option<i64>,
}

impl StatsWindow {
    fn begin(&mut self, now: i64) {
        self.started_at.get_or_insert(now);
    }

    fn record(&mut self, process_time: Duration) {
        self.stats.frame_count += 1;
        self.stats.total_process_time += process_time;
    }

    /// Closes the window once it spans `window`, returning the closed stats.
    fn roll(&mut self, now: i64, window: Duration) -> Option<PerformanceStats> {
        let started = *self.started_at.get_or_insert(now);
        let elapsed = now.saturating_sub(started);
        if elapsed <= 0 || elapsed < window.as_micros() as i64 {
            return None;
        }

        let stats = &mut self.stats;
        stats.current_fps = stats.frame_count as f32 / (elapsed as f32 / 1_000_000.0);
        stats.avg_process_time = if stats.frame_count > 0 {
            stats.total_process_time / stats.frame_count
        } else {
            Duration::ZERO
        };
        let closed = *stats;

        stats.frame_count = 0;
        stats.total_process_time = Duration::ZERO;
        stats.dropped_frames = 0;
        self.started_at = Some(now);
        Some(closed)
    }
}

impl<S: FrameSource, E: DetectionEngine> FrameProcessor<S, E> {
    pub fn new(source: S, engine: E, options: ProcessorOptions) -> Self {
        Self::with_clock(source, engine, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: S,
        mut engine: E,
        options: ProcessorOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let controller = AdaptiveController::new(options.adaptive);
        engine.set_min_confidence(controller.min_confidence());

        Self {
            shared: Arc::new(Shared {
                source: Mutex::new(source),
                engine: Mutex::new(engine),
                clock,
                options,
                latest: RwLock::new(Arc::new(DetectionResult::empty())),
                stats: Mutex::new(StatsWindow::default()),
                controller: Mutex::new(controller),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                last_timestamp: AtomicI64::new(0),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Starts the drive loop on its own thread. Does nothing if already running.
    pub fn start(&self) -> io::Result<()> {
        let mut driver = lock(&self.driver);
        if driver.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("pose-frame-processor".into())
            .spawn(move || drive(shared, stop_flag))?;

        *driver = Some(Driver { stop, handle });
        log::info!(
            "frame processor started (tick {:?}, stats window {:?})",
            self.shared.options.tick_interval,
            self.shared.options.stats_window
        );
        Ok(())
    }

    /// Stops the drive loop and clears the cached result and statistics.
    ///
    /// A detection still running when this is called finishes, but its result
    /// is thrown away.
    pub fn stop(&self) {
        let driver = lock(&self.driver).take();
        self.shared.invalidate();
        if let Some(driver) = driver {
            driver.shutdown();
            log::info!("frame processor stopped");
        }
        // The loop may have started one last cycle before seeing the flag.
        self.shared.invalidate();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.driver).is_some()
    }

    /// Runs one capture/detect cycle. Normally called by the drive loop.
    pub fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }

    pub fn latest(&self) -> Arc<DetectionResult> {
        self.shared.latest()
    }

    pub fn stats(&self) -> PerformanceStats {
        lock(&self.shared.stats).stats
    }

    pub fn adaptive_config(&self) -> AdaptiveConfig {
        lock(&self.shared.controller).config()
    }
}

impl<S, E> Drop for FrameProcessor<S, E> {
    fn drop(&mut self) {
        let driver = self
            .driver
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = driver {
            driver.shutdown();
        }
    }
}

fn drive<S: FrameSource, E: DetectionEngine>(shared: Arc<Shared<S, E>>, stop: Arc<AtomicBool>) {
    let interval = shared.options.tick_interval;
    while !stop.load(Ordering::Acquire) {
        let deadline = Instant::now() + interval;
        let outcome = shared.tick();
        log::trace!("frame processor tick: {outcome:?}");

        while !stop.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

impl<S: FrameSource, E: DetectionEngine> Shared<S, E> {
    fn latest(&self) -> Arc<DetectionResult> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn tick(&self) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            lock(&self.stats).stats.dropped_frames += 1;
            return TickOutcome::Dropped;
        }

        let generation = self.generation.load(Ordering::Acquire);
        lock(&self.stats).begin(self.clock.now_micros());
        let outcome = self.run_cycle(generation);
        if outcome != TickOutcome::Discarded {
            self.roll_stats();
        }
        self.in_flight.store(false, Ordering::Release);
        outcome
    }

    fn run_cycle(&self, generation: u64) -> TickOutcome {
        let (captured, skipped) = {
            let mut source = lock(&self.source);
            (source.try_capture_frame(), source.take_skipped())
        };
        if skipped > 0 {
            self.count_skipped(generation, skipped);
        }
        let frame = match captured {
            Ok(Some(frame)) => frame,
            Ok(None) => return TickOutcome::SourceNotReady,
            Err(err) => {
                log::warn!("frame capture failed: {err}");
                let result = DetectionResult::failure(err.to_string(), self.clock.now_micros(), 0.0);
                return self.publish(generation, result, None);
            }
        };

        let timestamp = self.next_timestamp();
        let min_confidence = lock(&self.controller).min_confidence();
        let started = self.clock.now_micros();
        let detection = lock(&self.engine).detect(&frame, timestamp);
        let process_time = Duration::from_micros(
            self.clock.now_micros().saturating_sub(started).max(0) as u64,
        );
        drop(frame);

        let result = match detection {
            Ok(output) => build_result(output, timestamp, min_confidence),
            Err(EngineError::NotReady) => {
                log::trace!("detection engine not ready, skipping frame");
                return TickOutcome::EngineNotReady;
            }
            Err(EngineError::Failed(reason)) => {
                log::warn!("pose detection failed: {reason}");
                DetectionResult::failure(reason, timestamp, 0.0)
            }
        };
        self.publish(generation, result, Some(process_time))
    }

    fn publish(
        &self,
        generation: u64,
        mut result: DetectionResult,
        process_time: Option<Duration>,
    ) -> TickOutcome {
        // Holding the stats lock orders this against `invalidate`.
        let mut stats = lock(&self.stats);
        if self.generation.load(Ordering::Acquire) != generation {
            log::debug!("discarding detection that finished after stop");
            return TickOutcome::Discarded;
        }

        if let Some(process_time) = process_time {
            stats.record(process_time);
        }
        result.fps = stats.stats.current_fps;
        let outcome = if result.success {
            TickOutcome::Completed {
                detected: result.detected,
            }
        } else {
            TickOutcome::Failed
        };
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(result);
        outcome
    }

    fn count_skipped(&self, generation: u64, skipped: u32) {
        let mut stats = lock(&self.stats);
        if self.generation.load(Ordering::Acquire) == generation {
            stats.stats.dropped_frames = stats.stats.dropped_frames.saturating_add(skipped);
        }
    }

    fn roll_stats(&self) {
        let now = self.clock.now_micros();
        let Some(closed) = lock(&self.stats).roll(now, self.options.stats_window) else {
            return;
        };

        let (adjustment, min_confidence) = {
            let mut controller = lock(&self.controller);
            let adjustment = controller.update(&closed);
            (adjustment, controller.min_confidence())
        };

        log::debug!(
            "pose pipeline: {:.1} fps, {:.1} ms avg, {} dropped, min confidence {:.1}",
            closed.current_fps,
            closed.avg_process_ms(),
            closed.dropped_frames,
            min_confidence
        );

        if adjustment != QualityAdjustment::Unchanged {
            log::info!("adaptive quality {adjustment:?}: min confidence now {min_confidence:.1}");
            lock(&self.engine).set_min_confidence(min_confidence);
        }
    }

    /// `max(last + 1, now)`, so engine timestamps stay strictly increasing even
    /// when the clock stalls or steps back.
    fn next_timestamp(&self) -> i64 {
        let now = self.clock.now_micros();
        let previous = self
            .last_timestamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    fn invalidate(&self) {
        let mut stats = lock(&self.stats);
        self.generation.fetch_add(1, Ordering::AcqRel);
        *stats = StatsWindow::default();
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(DetectionResult::empty());
    }
}

fn build_result(output: EngineOutput, timestamp: i64, min_confidence: f32) -> DetectionResult {
    let score = output.pose_score();
    let mut landmarks = output.landmarks;
    if !landmarks.is_empty() && landmarks.len() != POSE_LANDMARK_COUNT {
        return DetectionResult::failure(
            format!(
                "engine returned {} landmarks, expected {POSE_LANDMARK_COUNT}",
                landmarks.len()
            ),
            timestamp,
            0.0,
        );
    }

    landmarks.sort_by_key(|landmark| landmark.index);
    if let Some((slot, landmark)) = landmarks
        .iter()
        .enumerate()
        .find(|(slot, landmark)| landmark.index != *slot)
    {
        return DetectionResult::failure(
            format!(
                "engine returned landmark index {} where {slot} was expected",
                landmark.index
            ),
            timestamp,
            0.0,
        );
    }

    let detected = !landmarks.is_empty() && score >= min_confidence;
    if !detected {
        landmarks.clear();
    }

    DetectionResult {
        success: true,
        detected,
        landmarks,
        timestamp,
        fps: 0.0,
        error: None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
