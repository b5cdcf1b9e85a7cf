use std::{
    io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use thiserror::Error;

use super::rgba_converter;
use crate::types::Frame;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame stream disconnected")]
    Disconnected,
    #[error("frame buffer size mismatch: got {got}, expected {expected}")]
    Malformed { got: usize, expected: usize },
}

/// Non-blocking producer of frames. `Ok(None)` means no new frame is ready yet.
pub trait FrameSource: Send + 'static {
    fn try_capture_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Frames that arrived but were passed over since the last call.
    fn take_skipped(&mut self) -> u32 {
        0
    }
}

impl FrameSource for Box<dyn FrameSource> {
    fn try_capture_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).try_capture_frame()
    }

    fn take_skipped(&mut self) -> u32 {
        (**self).take_skipped()
    }
}

/// Reads frames pushed into a channel by a capture thread, always keeping only
/// the newest one.
pub struct ChannelSource {
    frame_rx: Receiver<Frame>,
    skipped: u32,
}

impl ChannelSource {
    pub fn new(frame_rx: Receiver<Frame>) -> Self {
        Self {
            frame_rx,
            skipped: 0,
        }
    }
}

impl FrameSource for ChannelSource {
    fn try_capture_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let mut frame = match self.frame_rx.try_recv() {
            Ok(frame) => frame,
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Disconnected) => return Err(SourceError::Disconnected),
        };
        // Skip stale frames queued while the detector was busy.
        while let Ok(newer) = self.frame_rx.try_recv() {
            frame = newer;
            self.skipped = self.skipped.saturating_add(1);
        }

        if !frame.is_well_formed() {
            return Err(SourceError::Malformed {
                got: frame.rgba.len(),
                expected: frame.expected_len(),
            });
        }
        Ok(Some(frame))
    }

    fn take_skipped(&mut self) -> u32 {
        std::mem::take(&mut self.skipped)
    }
}

#[derive(Debug)]
pub struct FrameStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FrameStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("frame replay thread panicked");
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Replays `frames` in a loop at roughly `fps`, restamping each one with the
/// current time. Frames are dropped when the receiver has not picked up the
/// previous one yet.
pub fn start_replay_stream(
    frames: Vec<Frame>,
    fps: f32,
    frame_tx: Sender<Frame>,
) -> io::Result<FrameStream> {
    if frames.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "replay stream needs at least one frame",
        ));
    }

    let interval = Duration::from_secs_f32(1.0 / fps.max(1.0));
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::Builder::new()
        .name("pose-frame-replay".into())
        .spawn(move || {
            let mut next = 0usize;
            while !stop_flag.load(Ordering::Relaxed) {
                let frame_start = Instant::now();
                let mut frame = frames[next].clone();
                frame.timestamp = Instant::now();
                next = (next + 1) % frames.len();

                // Drop if the processor is busy, otherwise forward every frame.
                if let Err(err) = frame_tx.try_send(frame) {
                    if err.is_disconnected() {
                        log::debug!("replay receiver gone, stopping stream");
                        break;
                    }
                }

                if let Some(rest) = interval.checked_sub(frame_start.elapsed()) {
                    thread::sleep(rest);
                }
            }
        })?;

    Ok(FrameStream {
        stop,
        handle: Some(handle),
    })
}

pub fn load_frames(paths: &[PathBuf]) -> Result<Vec<Frame>> {
    paths
        .iter()
        .map(|path| {
            let image = image::open(path)
                .with_context(|| format!("failed to open image {}", path.display()))?;
            let converted = rgba_converter::convert_image(&image)
                .with_context(|| format!("failed to convert {}", path.display()))?;
            Ok(Frame::new(converted.rgba, converted.width, converted.height))
        })
        .collect()
}

/// Generates a bright moving diagonal gradient, useful when no images are
/// supplied.
pub fn synthetic_frames(count: usize, width: u32, height: u32) -> Vec<Frame> {
    (0..count.max(1))
        .map(|n| {
            let shift = (n * 7) as u32;
            let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
            for y in 0..height {
                for x in 0..width {
                    let v = ((x + y + shift) % 256) as u8;
                    rgb.extend_from_slice(&[v, 255 - v / 2, 200]);
                }
            }
            let converted = rgba_converter::convert_raw(
                &rgb,
                width,
                height,
                rgba_converter::PixelLayout::Rgb,
            );
            match converted {
                Ok(frame) => Frame::new(frame.rgba, frame.width, frame.height),
                Err(err) => {
                    log::warn!("failed to build synthetic frame {n}: {err:?}");
                    Frame::new(vec![0; width as usize * height as usize * 4], width, height)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    fn frame(value: u8) -> Frame {
        Frame::new(vec![value; 4 * 4 * 4], 4, 4)
    }

    #[test]
    fn channel_source_returns_none_when_empty() {
        let (_tx, rx) = bounded::<Frame>(2);
        let mut source = ChannelSource::new(rx);
        assert!(source.try_capture_frame().unwrap().is_none());
    }

    #[test]
    fn channel_source_keeps_newest_frame() {
        let (tx, rx) = bounded(4);
        tx.send(frame(1)).unwrap();
        tx.send(frame(2)).unwrap();
        tx.send(frame(3)).unwrap();
        let mut source = ChannelSource::new(rx);
        let got = source.try_capture_frame().unwrap().unwrap();
        assert_eq!(got.rgba[0], 3);
        assert_eq!(source.take_skipped(), 2);
        assert_eq!(source.take_skipped(), 0);
        assert!(source.try_capture_frame().unwrap().is_none());
    }

    #[test]
    fn channel_source_reports_disconnect_and_bad_buffers() {
        let (tx, rx) = bounded(1);
        tx.send(Frame::new(vec![0; 3], 4, 4)).unwrap();
        let mut source = ChannelSource::new(rx);
        assert!(matches!(
            source.try_capture_frame(),
            Err(SourceError::Malformed { got: 3, expected: 64 })
        ));
        drop(tx);
        assert!(matches!(
            source.try_capture_frame(),
            Err(SourceError::Disconnected)
        ));
    }

    #[test]
    fn replay_stream_delivers_frames() {
        let (tx, rx) = bounded(1);
        let stream = start_replay_stream(vec![frame(9)], 200.0, tx).unwrap();
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got.rgba[0], 9);
        stream.stop();
    }

    #[test]
    fn replay_stream_rejects_empty_input() {
        let (tx, _rx) = bounded(1);
        assert!(start_replay_stream(Vec::new(), 30.0, tx).is_err());
    }

    #[test]
    fn synthetic_frames_are_well_formed() {
        let frames = synthetic_frames(3, 8, 6);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(Frame::is_well_formed));
    }
}
