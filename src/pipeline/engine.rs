use std::{io, thread};

use crossbeam_channel::{Receiver, bounded};
use thiserror::Error;

use super::readiness::Readiness;
use crate::types::{Frame, Landmark};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("detection engine is not ready")]
    NotReady,
    #[error("detection failed: {0}")]
    Failed(String),
}

/// What an engine returns for one frame: no pose (empty landmarks) or a full
/// skeleton with an optional pose-level presence score.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineOutput {
    pub landmarks: Vec<Landmark>,
    pub score: Option<f32>,
}

impl EngineOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn pose(landmarks: Vec<Landmark>, score: f32) -> Self {
        Self {
            landmarks,
            score: Some(score),
        }
    }

    /// Presence score, falling back to mean landmark visibility.
    pub fn pose_score(&self) -> f32 {
        match self.score {
            Some(score) => score,
            None if self.landmarks.is_empty() => 0.0,
            None => {
                self.landmarks.iter().map(|l| l.visibility).sum::<f32>()
                    / self.landmarks.len() as f32
            }
        }
    }
}

/// Adapter over a pose-landmark detector.
///
/// `timestamp_micros` is strictly increasing across calls on one instance.
pub trait DetectionEngine: Send + 'static {
    fn detect(&mut self, frame: &Frame, timestamp_micros: i64)
    -> Result<EngineOutput, EngineError>;

    /// Called when the adaptive controller moves the confidence threshold.
    /// Engines that cannot be reconfigured ignore it; results are gated on
    /// the threshold either way.
    fn set_min_confidence(&mut self, _min_confidence: f32) {}
}

impl DetectionEngine for Box<dyn DetectionEngine> {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_micros: i64,
    ) -> Result<EngineOutput, EngineError> {
        (**self).detect(frame, timestamp_micros)
    }

    fn set_min_confidence(&mut self, min_confidence: f32) {
        (**self).set_min_confidence(min_confidence)
    }
}

/// Engine that is built on a background thread. Reports
/// [`EngineError::NotReady`] until the loader has finished.
pub struct LazyEngine<E> {
    engine: Option<E>,
    engine_rx: Receiver<E>,
    readiness: Readiness,
    pending_confidence: Option<f32>,
    loader: Option<thread::JoinHandle<()>>,
}

impl<E: DetectionEngine> LazyEngine<E> {
    pub fn spawn<F>(name: &str, load: F) -> io::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<E> + Send + 'static,
    {
        let readiness = Readiness::new();
        let (engine_tx, engine_rx) = bounded(1);
        let loader_readiness = readiness.clone();
        let label = name.to_string();

        let loader = thread::Builder::new()
            .name(format!("{name}-loader"))
            .spawn(move || {
                if let Err(err) = loader_readiness.begin() {
                    log::error!("cannot initialize {label}: {err}");
                    return;
                }
                match load() {
                    Ok(engine) => {
                        // Capacity 1 and a single send: never blocks.
                        if engine_tx.send(engine).is_ok() {
                            log::info!("{label} ready");
                            let _ = loader_readiness.mark_ready();
                        }
                    }
                    Err(err) => {
                        log::error!("failed to load {label}: {err:?}");
                        let _ = loader_readiness.mark_failed(format!("{err:#}"));
                    }
                }
            })?;

        Ok(Self {
            engine: None,
            engine_rx,
            readiness,
            pending_confidence: None,
            loader: Some(loader),
        })
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    fn engine_mut(&mut self) -> Option<&mut E> {
        if self.engine.is_none() {
            let mut engine = self.engine_rx.try_recv().ok()?;
            if let Some(min_confidence) = self.pending_confidence.take() {
                engine.set_min_confidence(min_confidence);
            }
            self.engine = Some(engine);
            if let Some(loader) = self.loader.take() {
                let _ = loader.join();
            }
        }
        self.engine.as_mut()
    }
}

impl<E: DetectionEngine> DetectionEngine for LazyEngine<E> {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_micros: i64,
    ) -> Result<EngineOutput, EngineError> {
        match self.engine_mut() {
            Some(engine) => engine.detect(frame, timestamp_micros),
            None => Err(EngineError::NotReady),
        }
    }

    fn set_min_confidence(&mut self, min_confidence: f32) {
        match self.engine.as_mut() {
            Some(engine) => engine.set_min_confidence(min_confidence),
            None => self.pending_confidence = Some(min_confidence),
        }
    }
}
