use crate::errors::TapeError;
use crate::event::Event;
use crate::logging::JsonlLogger;
use crate::value::Value;
use serde_json::json;

/// Lifecycle hooks around each replayed event.
pub trait PlaybackListener {
    fn before_playback(&mut self, _index: usize, _event: &Event) {}

    fn after_playback(&mut self, _index: usize, _event: &Event, _result: &Value) {}

    /// Decide what happens after a failed event: `Ok` continues with the next
    /// event, `Err` aborts the run with that error.
    fn playback_exception(
        &mut self,
        index: usize,
        event: &Event,
        error: TapeError,
    ) -> Result<(), TapeError>;
}

impl<L: PlaybackListener + ?Sized> PlaybackListener for &mut L {
    fn before_playback(&mut self, index: usize, event: &Event) {
        (**self).before_playback(index, event);
    }

    fn after_playback(&mut self, index: usize, event: &Event, result: &Value) {
        (**self).after_playback(index, event, result);
    }

    fn playback_exception(
        &mut self,
        index: usize,
        event: &Event,
        error: TapeError,
    ) -> Result<(), TapeError> {
        (**self).playback_exception(index, event, error)
    }
}

/// Abort on the first failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct HaltOnException;

impl PlaybackListener for HaltOnException {
    fn playback_exception(
        &mut self,
        _index: usize,
        _event: &Event,
        error: TapeError,
    ) -> Result<(), TapeError> {
        Err(error)
    }
}

/// Keep going, remembering every failure.
#[derive(Debug, Default, Clone)]
pub struct ContinueOnException {
    pub failures: Vec<(usize, TapeError)>,
}

impl PlaybackListener for ContinueOnException {
    fn playback_exception(
        &mut self,
        index: usize,
        _event: &Event,
        error: TapeError,
    ) -> Result<(), TapeError> {
        self.failures.push((index, error));
        Ok(())
    }
}

/// Writes each lifecycle step to a JSONL log, then defers to `inner`.
pub struct LoggingListener<L> {
    logger: JsonlLogger,
    inner: L,
}

impl<L: PlaybackListener> LoggingListener<L> {
    pub fn new(logger: JsonlLogger, inner: L) -> Self {
        Self { logger, inner }
    }

    pub fn into_inner(self) -> L {
        self.inner
    }

    fn log(&self, level: &str, event_type: &str, payload: serde_json::Value) {
        // Logging failures must not change the outcome of playback.
        let _ = self.logger.log(level, event_type, payload);
    }
}

impl<L: PlaybackListener> PlaybackListener for LoggingListener<L> {
    fn before_playback(&mut self, index: usize, event: &Event) {
        self.log(
            "debug",
            "playback_started",
            json!({
                "index": index,
                "target": event.target().type_name(),
                "method": event.method(),
            }),
        );
        self.inner.before_playback(index, event);
    }

    fn after_playback(&mut self, index: usize, event: &Event, result: &Value) {
        self.log(
            "info",
            "playback_completed",
            json!({
                "index": index,
                "method": event.method(),
                "result": result.describe(),
            }),
        );
        self.inner.after_playback(index, event, result);
    }

    fn playback_exception(
        &mut self,
        index: usize,
        event: &Event,
        error: TapeError,
    ) -> Result<(), TapeError> {
        self.log(
            "error",
            "playback_exception",
            json!({
                "index": index,
                "method": event.method(),
                "error": error.to_string(),
            }),
        );
        self.inner.playback_exception(index, event, error)
    }
}
