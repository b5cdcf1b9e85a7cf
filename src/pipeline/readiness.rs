//! Initialization state of a detection engine.
//!
//! Engines move through `Uninitialized -> Initializing -> Ready | Failed`. Callers
//! either block on [`Readiness::wait_ready`] or [`Readiness::subscribe`] to the
//! transitions instead of polling a flag.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

impl EngineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EngineStatus::Uninitialized => "uninitialized",
            EngineStatus::Initializing => "initializing",
            EngineStatus::Ready => "ready",
            EngineStatus::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineStatus::Ready | EngineStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("engine did not become ready within {0:?}")]
    Timeout(Duration),
    #[error("engine initialization failed: {0}")]
    Failed(String),
    #[error("invalid engine state transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Clone, Default)]
pub struct Readiness {
    inner: Arc<Inner>,
}

struct Inner {
    status: Mutex<EngineStatus>,
    changed: Condvar,
    subscribers: Mutex<Vec<Sender<EngineStatus>>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            status: Mutex::new(EngineStatus::Uninitialized),
            changed: Condvar::new(),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> EngineStatus {
        lock(&self.inner.status).clone()
    }

    pub fn is_ready(&self) -> bool {
        *lock(&self.inner.status) == EngineStatus::Ready
    }

    pub fn begin(&self) -> Result<(), ReadinessError> {
        self.transition(EngineStatus::Initializing)
    }

    pub fn mark_ready(&self) -> Result<(), ReadinessError> {
        self.transition(EngineStatus::Ready)
    }

    pub fn mark_failed(&self, reason: impl Into<String>) -> Result<(), ReadinessError> {
        self.transition(EngineStatus::Failed(reason.into()))
    }

    /// Returns a channel that first yields the current status, then every
    /// later transition.
    pub fn subscribe(&self) -> Receiver<EngineStatus> {
        let (tx, rx) = unbounded();
        let status = lock(&self.inner.status);
        let _ = tx.send(status.clone());
        lock(&self.inner.subscribers).push(tx);
        rx
    }

    pub fn wait_ready(&self, timeout: Duration) -> Result<(), ReadinessError> {
        let status = lock(&self.inner.status);
        let (status, _) = self
            .inner
            .changed
            .wait_timeout_while(status, timeout, |status| !status.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);

        match &*status {
            EngineStatus::Ready => Ok(()),
            EngineStatus::Failed(reason) => Err(ReadinessError::Failed(reason.clone())),
            _ => Err(ReadinessError::Timeout(timeout)),
        }
    }

    fn transition(&self, next: EngineStatus) -> Result<(), ReadinessError> {
        let mut status = lock(&self.inner.status);
        let allowed = matches!(
            (&*status, &next),
            (EngineStatus::Uninitialized, EngineStatus::Initializing)
                | (EngineStatus::Initializing, EngineStatus::Ready)
                | (EngineStatus::Initializing, EngineStatus::Failed(_))
        );
        if !allowed {
            return Err(ReadinessError::InvalidTransition {
                from: status.label(),
                to: next.label(),
            });
        }

        log::debug!("engine {} -> {}", status.label(), next.label());
        *status = next.clone();
        lock(&self.inner.subscribers).retain(|tx| tx.send(next.clone()).is_ok());
        drop(status);
        self.inner.changed.notify_all();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn walks_the_happy_path() {
        let readiness = Readiness::new();
        assert_eq!(readiness.status(), EngineStatus::Uninitialized);
        readiness.begin().unwrap();
        readiness.mark_ready().unwrap();
        assert!(readiness.is_ready());
        assert_eq!(readiness.wait_ready(Duration::ZERO), Ok(()));
    }

    #[test]
    fn rejects_out_of_order_transitions() {
        let readiness = Readiness::new();
        assert_eq!(
            readiness.mark_ready(),
            Err(ReadinessError::InvalidTransition {
                from: "uninitialized",
                to: "ready",
            })
        );
        readiness.begin().unwrap();
        readiness.mark_failed("boom").unwrap();
        assert!(readiness.mark_ready().is_err());
        assert!(readiness.begin().is_err());
    }

    #[test]
    fn wait_times_out_while_initializing() {
        let readiness = Readiness::new();
        readiness.begin().unwrap();
        assert_eq!(
            readiness.wait_ready(Duration::from_millis(20)),
            Err(ReadinessError::Timeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn wait_wakes_on_ready_from_another_thread() {
        let readiness = Readiness::new();
        let remote = readiness.clone();
        let handle = thread::spawn(move || {
            remote.begin().unwrap();
            thread::sleep(Duration::from_millis(10));
            remote.mark_ready().unwrap();
        });
        assert_eq!(readiness.wait_ready(Duration::from_secs(5)), Ok(()));
        handle.join().unwrap();
    }

    #[test]
    fn subscribers_see_current_status_then_transitions() {
        let readiness = Readiness::new();
        let rx = readiness.subscribe();
        readiness.begin().unwrap();
        readiness.mark_failed("no model").unwrap();

        let seen: Vec<EngineStatus> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                EngineStatus::Uninitialized,
                EngineStatus::Initializing,
                EngineStatus::Failed("no model".into()),
            ]
        );
        assert_eq!(
            readiness.wait_ready(Duration::ZERO),
            Err(ReadinessError::Failed("no model".into()))
        );
    }
}
