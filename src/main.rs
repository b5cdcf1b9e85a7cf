use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::bounded;
use pose_pipeline::{
    config::PipelineConfig,
    pipeline::{
        ChannelSource, FrameProcessor, LazyEngine, SyntheticPoseEngine, draw_pose, load_frames,
        start_replay_stream, start_result_poller, synthetic_frames,
    },
    types::{Frame, Landmark},
};

const USAGE: &str = "Usage: pose-pipeline [--config <path>] [--frames <n>] [--fps <n>] \
[--seconds <n>] [--latency-ms <n>] [--output <png>] [image ...]";

const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    frames: usize,
    fps: f32,
    seconds: f32,
    latency: Duration,
    output: Option<PathBuf>,
    images: Vec<PathBuf>,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = Args {
            config: None,
            frames: 30,
            fps: 30.0,
            seconds: 3.0,
            latency: Duration::from_millis(8),
            output: None,
            images: Vec::new(),
        };

        let mut idx = 1;
        while idx < args.len() {
            let flag = args[idx].as_str();
            match flag {
                "-h" | "--help" => bail!(USAGE),
                "--config" => parsed.config = Some(PathBuf::from(value(args, &mut idx, flag)?)),
                "--output" => parsed.output = Some(PathBuf::from(value(args, &mut idx, flag)?)),
                "--frames" => {
                    parsed.frames = value(args, &mut idx, flag)?
                        .parse()
                        .with_context(|| format!("{flag} expects a frame count"))?
                }
                "--fps" => {
                    parsed.fps = value(args, &mut idx, flag)?
                        .parse()
                        .with_context(|| format!("{flag} expects a number"))?
                }
                "--seconds" => {
                    parsed.seconds = value(args, &mut idx, flag)?
                        .parse()
                        .with_context(|| format!("{flag} expects a number"))?
                }
                "--latency-ms" => {
                    let ms: u64 = value(args, &mut idx, flag)?
                        .parse()
                        .with_context(|| format!("{flag} expects milliseconds"))?;
                    parsed.latency = Duration::from_millis(ms);
                }
                other if other.starts_with("--") => bail!("unknown flag {other}\n{USAGE}"),
                path => parsed.images.push(PathBuf::from(path)),
            }
            idx += 1;
        }

        if parsed.frames == 0 {
            bail!("--frames must be positive");
        }
        if !(parsed.seconds.is_finite() && parsed.seconds > 0.0) {
            bail!("--seconds must be positive");
        }
        Ok(parsed)
    }
}

fn value<'a>(args: &'a [String], idx: &mut usize, flag: &str) -> Result<&'a str> {
    *idx += 1;
    args.get(*idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn main() -> Result<()> {
    env_logger::init();

    let raw: Vec<String> = std::env::args().collect();
    let args = Args::parse(&raw)?;
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let frames = if args.images.is_empty() {
        synthetic_frames(args.frames, 320, 240)
    } else {
        load_frames(&args.images)?
    };
    let preview = frames.first().cloned();

    let (frame_tx, frame_rx) = bounded(1);
    let stream = start_replay_stream(frames, args.fps, frame_tx)?;

    let latency = args.latency;
    let engine = LazyEngine::spawn("pose-engine", move || {
        Ok(SyntheticPoseEngine::new().with_latency(latency))
    })?;
    let readiness = engine.readiness();

    let processor = Arc::new(FrameProcessor::new(
        ChannelSource::new(frame_rx),
        engine,
        config.processor_options(),
    ));
    processor.start()?;

    readiness
        .wait_ready(ENGINE_READY_TIMEOUT)
        .context("pose engine did not become ready")?;

    let shown: Arc<Mutex<Vec<Landmark>>> = Arc::default();
    let shown_sink = shown.clone();
    let mut smoother = config.smoother();
    let poller = start_result_poller(processor.clone(), config.poll_interval(), move |result| {
        let visible = smoother.apply(&result);
        if let Some(err) = &result.error {
            log::warn!("detection failed: {err}");
        }
        *shown_sink.lock().unwrap_or_else(PoisonError::into_inner) = visible;
    })?;

    let reporting = Duration::from_secs_f32(args.seconds);
    let mut elapsed = Duration::ZERO;
    while elapsed < reporting {
        let step = Duration::from_secs(1).min(reporting - elapsed);
        thread::sleep(step);
        elapsed += step;

        let stats = processor.stats();
        let latest = processor.latest();
        log::info!(
            "fps {:.1} | avg {:.1} ms | dropped {} | min_confidence {:.1} | detected {}",
            stats.current_fps,
            stats.avg_process_ms(),
            stats.dropped_frames,
            processor.adaptive_config().min_confidence,
            latest.detected
        );
    }

    poller.stop();
    processor.stop();
    stream.stop();

    let visible = std::mem::take(&mut *shown.lock().unwrap_or_else(PoisonError::into_inner));
    println!(
        "{} landmarks visible at shutdown, min_confidence {:.1}",
        visible.len(),
        processor.adaptive_config().min_confidence
    );

    if let Some(path) = &args.output {
        let frame = preview.ok_or_else(|| anyhow!("no frame to draw on"))?;
        save_preview(frame, &visible, path)?;
        println!("wrote {}", path.display());
    }

    Ok(())
}

fn save_preview(frame: Frame, landmarks: &[Landmark], path: &Path) -> Result<()> {
    let Frame {
        mut rgba,
        width,
        height,
        ..
    } = frame;
    draw_pose(&mut rgba, width, height, landmarks);
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        std::iter::once("pose-pipeline")
            .chain(items.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_flags_and_images() {
        let args = Args::parse(&argv(&[
            "--frames", "5", "--seconds", "0.5", "--output", "out.png", "a.png", "b.jpg",
        ]))
        .unwrap();
        assert_eq!(args.frames, 5);
        assert_eq!(args.seconds, 0.5);
        assert_eq!(args.output, Some(PathBuf::from("out.png")));
        assert_eq!(args.images.len(), 2);
    }

    #[test]
    fn rejects_missing_values_and_unknown_flags() {
        assert!(Args::parse(&argv(&["--config"])).is_err());
        assert!(Args::parse(&argv(&["--bogus"])).is_err());
        assert!(Args::parse(&argv(&["--frames", "0"])).is_err());
    }
}
