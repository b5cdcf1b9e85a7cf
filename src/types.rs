use std::time::{Duration, Instant};

/// Number of landmarks produced by a full-body pose model.
pub const POSE_LANDMARK_COUNT: usize = 33;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.rgba.len() == self.expected_len()
    }
}

/// One normalized keypoint. `x`/`y` are relative to the frame size, `z` is a
/// relative depth of either sign.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
    pub index: usize,
}

impl Landmark {
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }

    pub fn kind(&self) -> Option<PoseLandmark> {
        PoseLandmark::from_index(self.index)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub success: bool,
    pub detected: bool,
    pub landmarks: Vec<Landmark>,
    /// Timestamp handed to the engine for this detection, in microseconds.
    pub timestamp: i64,
    pub fps: f32,
    pub error: Option<String>,
}

impl DetectionResult {
    /// Result served before anything has been detected.
    pub fn empty() -> Self {
        Self {
            success: true,
            detected: false,
            landmarks: Vec::new(),
            timestamp: 0,
            fps: 0.0,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, timestamp: i64, fps: f32) -> Self {
        Self {
            success: false,
            detected: false,
            landmarks: Vec::new(),
            timestamp,
            fps,
            error: Some(error.into()),
        }
    }

    pub fn landmark(&self, kind: PoseLandmark) -> Option<&Landmark> {
        self.landmarks.get(kind as usize)
    }
}

impl Default for DetectionResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// Throughput counters. `frame_count`, `total_process_time` and `dropped_frames`
/// cover the current statistics window; `current_fps` and `avg_process_time`
/// describe the last closed window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceStats {
    pub frame_count: u32,
    pub total_process_time: Duration,
    pub current_fps: f32,
    pub avg_process_time: Duration,
    pub dropped_frames: u32,
}

impl PerformanceStats {
    pub fn avg_process_ms(&self) -> f32 {
        self.avg_process_time.as_secs_f32() * 1000.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdaptiveConfig {
    pub target_fps: f32,
    pub min_confidence: f32,
    pub enable_adaptive_quality: bool,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            min_confidence: 0.5,
            enable_adaptive_quality: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl PoseLandmark {
    pub const ALL: [PoseLandmark; POSE_LANDMARK_COUNT] = [
        PoseLandmark::Nose,
        PoseLandmark::LeftEyeInner,
        PoseLandmark::LeftEye,
        PoseLandmark::LeftEyeOuter,
        PoseLandmark::RightEyeInner,
        PoseLandmark::RightEye,
        PoseLandmark::RightEyeOuter,
        PoseLandmark::LeftEar,
        PoseLandmark::RightEar,
        PoseLandmark::MouthLeft,
        PoseLandmark::MouthRight,
        PoseLandmark::LeftShoulder,
        PoseLandmark::RightShoulder,
        PoseLandmark::LeftElbow,
        PoseLandmark::RightElbow,
        PoseLandmark::LeftWrist,
        PoseLandmark::RightWrist,
        PoseLandmark::LeftPinky,
        PoseLandmark::RightPinky,
        PoseLandmark::LeftIndex,
        PoseLandmark::RightIndex,
        PoseLandmark::LeftThumb,
        PoseLandmark::RightThumb,
        PoseLandmark::LeftHip,
        PoseLandmark::RightHip,
        PoseLandmark::LeftKnee,
        PoseLandmark::RightKnee,
        PoseLandmark::LeftAnkle,
        PoseLandmark::RightAnkle,
        PoseLandmark::LeftHeel,
        PoseLandmark::RightHeel,
        PoseLandmark::LeftFootIndex,
        PoseLandmark::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            PoseLandmark::Nose => "nose",
            PoseLandmark::LeftEyeInner => "left eye (inner)",
            PoseLandmark::LeftEye => "left eye",
            PoseLandmark::LeftEyeOuter => "left eye (outer)",
            PoseLandmark::RightEyeInner => "right eye (inner)",
            PoseLandmark::RightEye => "right eye",
            PoseLandmark::RightEyeOuter => "right eye (outer)",
            PoseLandmark::LeftEar => "left ear",
            PoseLandmark::RightEar => "right ear",
            PoseLandmark::MouthLeft => "mouth (left)",
            PoseLandmark::MouthRight => "mouth (right)",
            PoseLandmark::LeftShoulder => "left shoulder",
            PoseLandmark::RightShoulder => "right shoulder",
            PoseLandmark::LeftElbow => "left elbow",
            PoseLandmark::RightElbow => "right elbow",
            PoseLandmark::LeftWrist => "left wrist",
            PoseLandmark::RightWrist => "right wrist",
            PoseLandmark::LeftPinky => "left pinky",
            PoseLandmark::RightPinky => "right pinky",
            PoseLandmark::LeftIndex => "left index",
            PoseLandmark::RightIndex => "right index",
            PoseLandmark::LeftThumb => "left thumb",
            PoseLandmark::RightThumb => "right thumb",
            PoseLandmark::LeftHip => "left hip",
            PoseLandmark::RightHip => "right hip",
            PoseLandmark::LeftKnee => "left knee",
            PoseLandmark::RightKnee => "right knee",
            PoseLandmark::LeftAnkle => "left ankle",
            PoseLandmark::RightAnkle => "right ankle",
            PoseLandmark::LeftHeel => "left heel",
            PoseLandmark::RightHeel => "right heel",
            PoseLandmark::LeftFootIndex => "left foot index",
            PoseLandmark::RightFootIndex => "right foot index",
        }
    }
}
