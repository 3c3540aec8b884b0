//! Progress and log reporting for patch runs.
//!
//! Observers are called synchronously on the thread running the engine.
//! Callers that need the events elsewhere (a UI thread) can hand the engine
//! an [`mpsc::Sender<EngineEvent>`] and drain the receiver.

use super::EngineState;
use std::sync::mpsc;
use tracing::{debug, info};

pub trait ApplyObserver {
    /// A human-readable log line.
    fn on_log(&mut self, _message: &str) {}

    /// Progress in percent, 0.0 to 100.0. Scanning and matching cover
    /// 0-50, serializing 50-75, committing 75-100.
    fn on_progress(&mut self, _percent: f64) {}

    fn on_state(&mut self, _state: EngineState) {}
}

/// Adapts a pair of closures into an observer.
pub struct Callbacks<L, P> {
    on_log: L,
    on_progress: P,
}

impl<L, P> Callbacks<L, P>
where
    L: FnMut(&str),
    P: FnMut(f64),
{
    pub fn new(on_log: L, on_progress: P) -> Self {
        Self {
            on_log,
            on_progress,
        }
    }
}

impl<L, P> ApplyObserver for Callbacks<L, P>
where
    L: FnMut(&str),
    P: FnMut(f64),
{
    fn on_log(&mut self, message: &str) {
        (self.on_log)(message)
    }

    fn on_progress(&mut self, percent: f64) {
        (self.on_progress)(percent)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ApplyObserver for NoopObserver {}

/// Forwards log lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ApplyObserver for TracingObserver {
    fn on_log(&mut self, message: &str) {
        info!("{message}");
    }

    fn on_progress(&mut self, percent: f64) {
        debug!(percent, "progress");
    }

    fn on_state(&mut self, state: EngineState) {
        debug!(%state, "state");
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub logs: Vec<String>,
    pub progress: Vec<f64>,
    pub states: Vec<EngineState>,
}

impl ApplyObserver for RecordingObserver {
    fn on_log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn on_progress(&mut self, percent: f64) {
        self.progress.push(percent);
    }

    fn on_state(&mut self, state: EngineState) {
        self.states.push(state);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Log(String),
    Progress(f64),
    State(EngineState),
}

/// Events are dropped silently once the receiver hangs up.
impl ApplyObserver for mpsc::Sender<EngineEvent> {
    fn on_log(&mut self, message: &str) {
        let _ = self.send(EngineEvent::Log(message.to_string()));
    }

    fn on_progress(&mut self, percent: f64) {
        let _ = self.send(EngineEvent::Progress(percent));
    }

    fn on_state(&mut self, state: EngineState) {
        let _ = self.send(EngineEvent::State(state));
    }
}
