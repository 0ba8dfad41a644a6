//! Processing context lifecycle.
//!
//! The context is the engine's clock and its gate on the platform autoplay
//! rule: under [`AutoplayPolicy::RequiresGesture`] it stays suspended until a
//! gesture handler calls [`ProcessingContext::resume`]. Work that needs a
//! running context is queued as a [`DeferredTask`] and handed back once it
//! starts, rather than failing.

use log::{debug, info};

use crate::config::AutoplayPolicy;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    Uninitialized,
    Suspended,
    Running,
    Closed,
}

/// Two-phase startup marker returned by [`ProcessingContext::ensure_running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
}

/// Work postponed until the context runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Synthesize the full-quality reverb impulse.
    BuildReverb,
}

#[derive(Debug)]
pub struct ProcessingContext {
    state: ContextState,
    sample_rate: u32,
    autoplay: AutoplayPolicy,
    /// Set by the first explicit resume; the platform allows audio afterwards.
    activated: bool,
    /// Frames rendered while running.
    frames: u64,
    pending: Vec<DeferredTask>,
}

impl ProcessingContext {
    pub fn new(sample_rate: u32, autoplay: AutoplayPolicy) -> Self {
        ProcessingContext {
            state: ContextState::Uninitialized,
            sample_rate,
            autoplay,
            activated: false,
            frames: 0,
            pending: Vec::new(),
        }
    }

    /// Create the context. A context the platform starts suspended gets one
    /// best-effort resume; staying suspended is not an error.
    pub fn initialize(&mut self) -> ContextState {
        if self.state == ContextState::Uninitialized {
            self.state = ContextState::Suspended;
            info!("context: created at {} Hz", self.sample_rate);
            self.try_resume();
        }
        self.state
    }

    /// Resume without a gesture. Returns whether the context is now running.
    pub fn try_resume(&mut self) -> bool {
        match self.state {
            ContextState::Running => true,
            ContextState::Closed | ContextState::Uninitialized => false,
            ContextState::Suspended => {
                if self.activated || self.autoplay == AutoplayPolicy::Allowed {
                    self.state = ContextState::Running;
                    info!("context: running");
                    true
                } else {
                    debug!("context: resume blocked until a user gesture");
                    false
                }
            }
        }
    }

    /// Resume from a user gesture. Safe to call repeatedly.
    pub fn resume(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(EngineError::ContextClosed);
        }
        self.activated = true;
        self.initialize();
        self.try_resume();
        Ok(())
    }

    /// Check the context before work that needs it running, nudging it once.
    pub fn ensure_running(&mut self) -> Readiness {
        if self.try_resume() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    /// Queue a task for when the context runs. Queuing twice keeps one.
    pub fn defer(&mut self, task: DeferredTask) {
        if !self.pending.contains(&task) {
            debug!("context: deferring {task:?}");
            self.pending.push(task);
        }
    }

    /// Drain queued tasks, but only once the context is running.
    pub fn take_ready(&mut self) -> Vec<DeferredTask> {
        if self.state == ContextState::Running {
            std::mem::take(&mut self.pending)
        } else {
            Vec::new()
        }
    }

    pub fn pending(&self) -> &[DeferredTask] {
        &self.pending
    }

    /// Close the context for good. Idempotent.
    pub fn close(&mut self) {
        if self.state != ContextState::Closed {
            info!("context: closed");
        }
        self.state = ContextState::Closed;
        self.pending.clear();
    }

    /// Move the clock forward. Only a running context keeps time.
    pub fn advance(&mut self, frames: usize) {
        if self.state == ContextState::Running {
            self.frames += frames as u64;
        }
    }

    pub fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate.max(1) as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ContextState::Running
    }
}
