use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::bounded;
use pose_pipeline::{
    pipeline::{
        ChannelSource, DetectionEngine, EngineError, EngineOutput, EngineStatus, FrameProcessor,
        FrameSource, LandmarkSmoother, LazyEngine, ManualClock, ProcessorOptions, SourceError,
        SyntheticPoseEngine, TickOutcome, start_replay_stream, start_result_poller,
        synthetic_frames,
    },
    types::{Frame, POSE_LANDMARK_COUNT},
};

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn replayed_frames_reach_the_cache_and_stop_clears_it() {
    let (frame_tx, frame_rx) = bounded(1);
    let stream = start_replay_stream(synthetic_frames(4, 64, 48), 60.0, frame_tx).unwrap();

    let engine = LazyEngine::spawn("test-engine", || Ok(SyntheticPoseEngine::new())).unwrap();
    let readiness = engine.readiness();
    let options = ProcessorOptions {
        tick_interval: Duration::from_millis(5),
        ..ProcessorOptions::default()
    };
    let processor = Arc::new(FrameProcessor::new(
        ChannelSource::new(frame_rx),
        engine,
        options,
    ));

    processor.start().unwrap();
    readiness.wait_ready(Duration::from_secs(5)).unwrap();
    assert_eq!(readiness.status(), EngineStatus::Ready);

    assert!(wait_until(Duration::from_secs(5), || processor.latest().detected));
    let latest = processor.latest();
    assert!(latest.success);
    assert_eq!(latest.landmarks.len(), POSE_LANDMARK_COUNT);
    assert!(latest.timestamp > 0);

    processor.stop();
    assert!(!processor.is_running());
    let cleared = processor.latest();
    assert!(!cleared.detected);
    assert!(cleared.landmarks.is_empty());
    assert_eq!(processor.stats().frame_count, 0);

    // Nothing from before the stop shows up later.
    thread::sleep(Duration::from_millis(30));
    assert!(!processor.latest().detected);

    stream.stop();
}

#[test]
fn poller_feeds_smoothed_landmarks() {
    let (frame_tx, frame_rx) = bounded(1);
    let stream = start_replay_stream(synthetic_frames(2, 32, 32), 60.0, frame_tx).unwrap();
    let processor = Arc::new(FrameProcessor::new(
        ChannelSource::new(frame_rx),
        SyntheticPoseEngine::new(),
        ProcessorOptions {
            tick_interval: Duration::from_millis(5),
            ..ProcessorOptions::default()
        },
    ));
    processor.start().unwrap();

    let (shown_tx, shown_rx) = bounded(16);
    let mut smoother = LandmarkSmoother::default();
    let poller = start_result_poller(processor.clone(), Duration::from_millis(5), move |result| {
        let visible = smoother.apply(&result);
        if !visible.is_empty() {
            let _ = shown_tx.try_send(visible);
        }
    })
    .unwrap();

    let visible = shown_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(visible.iter().all(|l| l.visibility >= 0.5));
    assert!(visible.iter().all(|l| l.index < POSE_LANDMARK_COUNT));

    poller.stop();
    processor.stop();
    stream.stop();
}

struct AlwaysFrame;

impl FrameSource for AlwaysFrame {
    fn try_capture_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(Some(Frame::new(vec![200; 4 * 4 * 4], 4, 4)))
    }
}

struct SlowEngine {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl DetectionEngine for SlowEngine {
    fn detect(&mut self, _frame: &Frame, _timestamp: i64) -> Result<EngineOutput, EngineError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(EngineOutput::empty())
    }
}

#[test]
fn concurrent_ticks_keep_one_detection_in_flight() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let engine = SlowEngine {
        active: active.clone(),
        peak: peak.clone(),
    };
    // A frozen clock keeps the stats window open so drops stay counted.
    let processor = Arc::new(FrameProcessor::with_clock(
        AlwaysFrame,
        engine,
        ProcessorOptions::default(),
        Arc::new(ManualClock::new(1_000_000)),
    ));

    let callers = 4;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let processor = processor.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                processor.tick()
            })
        })
        .collect();
    let outcomes: Vec<TickOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::Completed { .. }))
        .count();
    let dropped = outcomes
        .iter()
        .filter(|o| **o == TickOutcome::Dropped)
        .count();

    assert!(completed >= 1);
    assert_eq!(completed + dropped, callers);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(processor.stats().dropped_frames as usize, dropped);
    assert!(!processor.latest().detected);
}
