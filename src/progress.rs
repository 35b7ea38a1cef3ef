// src/progress.rs

//! Progress reporting for pipeline operations
//!
//! Every pipeline call reports coarse progress as a monotonic percentage over
//! [0, 100] on a caller-supplied sink. Sinks are invoked from worker threads
//! and must be thread-safe. [`PercentScope`] gives each call its terminal
//! guarantee: the sink always observes 100 followed by a completion signal,
//! on success and on failure alike.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Sink for progress updates
///
/// Implementations must be `Send + Sync`; updates may arrive from any worker
/// thread.
pub trait ProgressTracker: Send + Sync {
    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Set progress to a specific position
    fn set_position(&self, position: u64);

    /// Set the total (length) of the progress
    fn set_length(&self, length: u64);

    /// Current position
    fn position(&self) -> u64;

    /// Total length
    fn length(&self) -> u64;

    /// Finish successfully with a message
    fn finish_with_message(&self, message: &str);

    /// Finish with an error message
    fn finish_with_error(&self, message: &str);

    /// Whether a completion signal has been delivered
    fn is_finished(&self) -> bool;
}

/// No-op sink for quiet or scripted use
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn finish_with_error(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Sink that logs updates through tracing
///
/// Useful in services and tests where no interactive display exists.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
            length: AtomicU64::new(100),
            finished: AtomicBool::new(false),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn set_position(&self, position: u64) {
        let old = self.position.swap(position, Ordering::Relaxed);
        if position != old {
            info!("{}: {}%", self.name, position);
        }
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        info!("{}: ERROR - {}", self.name, message);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Events emitted by [`CallbackProgress`]
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Message updated
    Message(String),
    /// Position changed
    Position { current: u64, total: u64 },
    /// Finished successfully
    Finished(String),
    /// Finished with an error
    Error(String),
}

/// Sink that forwards updates to a user-provided function
///
/// The bridge between the pipeline and a GUI or a CLI progress bar.
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            position: AtomicU64::new(0),
            length: AtomicU64::new(100),
            finished: AtomicBool::new(false),
        }
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn set_message(&self, message: &str) {
        (self.callback)(ProgressEvent::Message(message.to_string()));
    }

    fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Position {
            current: position,
            total: self.length.load(Ordering::Relaxed),
        });
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Finished(message.to_string()));
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Error(message.to_string()));
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Monotonic percent scale over a sink, with a guaranteed terminal 100
///
/// Positions only move forward; a stale update from a slower worker can never
/// rewind the display. If the scope is dropped without [`complete`] having
/// been called (an error path unwound through `?`), the sink still receives
/// 100 and a failure completion.
///
/// [`complete`]: PercentScope::complete
pub struct PercentScope<'a> {
    sink: &'a dyn ProgressTracker,
    current: AtomicU64,
    completed: AtomicBool,
}

impl<'a> PercentScope<'a> {
    pub fn new(sink: &'a dyn ProgressTracker) -> Self {
        sink.set_length(100);
        sink.set_position(0);
        Self {
            sink,
            current: AtomicU64::new(0),
            completed: AtomicBool::new(false),
        }
    }

    /// Advance to a percentage; values behind the current position are
    /// ignored
    pub fn at(&self, percent: u64) {
        let percent = percent.min(100);
        let prev = self.current.fetch_max(percent, Ordering::SeqCst);
        if percent > prev {
            self.sink.set_position(percent);
        }
    }

    /// Advance within a sub-range: `fraction` of the span from `from` to
    /// `to`, as when downloads report per-byte progress inside one stage
    pub fn at_fraction(&self, from: u64, to: u64, fraction: f64) {
        let span = to.saturating_sub(from) as f64;
        self.at(from + (span * fraction.clamp(0.0, 1.0)) as u64);
    }

    /// Mark the operation successful: terminal 100 + completion signal
    pub fn complete(&self, message: &str) {
        self.completed.store(true, Ordering::SeqCst);
        self.sink.set_position(100);
        self.sink.finish_with_message(message);
    }
}

impl Drop for PercentScope<'_> {
    fn drop(&mut self) {
        if !self.completed.load(Ordering::SeqCst) {
            self.sink.set_position(100);
            self.sink.finish_with_error("operation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (
        Arc<Mutex<Vec<ProgressEvent>>>,
        CallbackProgress<impl Fn(ProgressEvent) + Send + Sync>,
    ) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink = CallbackProgress::new(move |event| {
            sink_events.lock().unwrap().push(event);
        });
        (events, sink)
    }

    #[test]
    fn test_silent_progress() {
        let progress = SilentProgress::new();
        progress.set_length(100);
        progress.set_position(10);
        assert_eq!(progress.position(), 10);
        assert!(!progress.is_finished());
        progress.finish_with_message("done");
        assert!(progress.is_finished());
    }

    #[test]
    fn test_callback_progress_events() {
        let (events, sink) = recording();
        sink.set_length(100);
        sink.set_message("checking");
        sink.set_position(50);
        sink.finish_with_message("done");

        let captured = events.lock().unwrap();
        assert!(matches!(&captured[0], ProgressEvent::Message(m) if m == "checking"));
        assert!(matches!(
            &captured[1],
            ProgressEvent::Position {
                current: 50,
                total: 100
            }
        ));
        assert!(matches!(&captured[2], ProgressEvent::Finished(m) if m == "done"));
    }

    #[test]
    fn test_percent_scope_is_monotonic() {
        let sink = SilentProgress::new();
        let scope = PercentScope::new(&sink);
        scope.at(40);
        scope.at(20); // stale update, ignored
        assert_eq!(sink.position(), 40);
        scope.at(95);
        assert_eq!(sink.position(), 95);
        scope.complete("ok");
        assert_eq!(sink.position(), 100);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_percent_scope_terminal_on_drop() {
        let sink = SilentProgress::new();
        {
            let scope = PercentScope::new(&sink);
            scope.at(30);
            // dropped without complete(), as on an error path
        }
        assert_eq!(sink.position(), 100);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_percent_scope_fraction() {
        let sink = SilentProgress::new();
        let scope = PercentScope::new(&sink);
        scope.at_fraction(10, 50, 0.5);
        assert_eq!(sink.position(), 30);
        scope.at_fraction(10, 50, 2.0); // clamped
        assert_eq!(sink.position(), 50);
        scope.complete("ok");
    }
}
