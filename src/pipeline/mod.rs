pub mod adaptive;
pub mod clock;
pub mod consumer;
pub mod engine;
pub mod processor;
pub mod readiness;
pub mod rgba_converter;
pub mod skeleton;
pub mod source;
pub mod synthetic;

// Re-exports for convenience
pub use adaptive::{AdaptiveController, QualityAdjustment};
pub use clock::{Clock, ManualClock, SystemClock};
pub use consumer::{LandmarkSmoother, LatestResult, ResultPoller, start_result_poller};
pub use engine::{DetectionEngine, EngineError, EngineOutput, LazyEngine};
pub use processor::{FrameProcessor, ProcessorOptions, TickOutcome};
pub use readiness::{EngineStatus, Readiness, ReadinessError};
pub use skeleton::draw_pose;
pub use source::{
    ChannelSource, FrameSource, FrameStream, SourceError, load_frames, start_replay_stream,
    synthetic_frames,
};
pub use synthetic::SyntheticPoseEngine;
