//! Session bookkeeping: stop signal, clock, per-session statistics.

use moodscan_core::TimeSeries;
use moodscan_hw::{Frame, FrameSource, SourceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Cooperative cancellation flag, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Time source for sampling decisions and timestamps.
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Why a session stopped reading frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The source ran out of frames.
    Exhausted,
    /// The stop signal was raised.
    Stopped,
    /// The configured session duration elapsed.
    DurationElapsed,
    /// The source failed to deliver the next frame.
    SourceFailed,
}

/// Counters for one analysis session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub faces_detected: u64,
    pub classifier_fallbacks: u64,
    pub landmark_failures: u64,
    pub blinks: u32,
}

/// Everything a session produced.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: Uuid,
    pub series: TimeSeries,
    pub stats: SessionStats,
    pub end: EndReason,
}

/// Closes the borrowed source when dropped, on every exit path.
pub(crate) struct SourceGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> SourceGuard<'a, S> {
    pub(crate) fn new(source: &'a mut S) -> Self {
        Self { source }
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.source.next_frame()
    }
}

impl<S: FrameSource + ?Sized> Drop for SourceGuard<'_, S> {
    fn drop(&mut self) {
        self.source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CloseCounter {
        closes: u32,
    }

    impl FrameSource for CloseCounter {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            Ok(None)
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    #[test]
    fn test_stop_signal_shared_between_clones() {
        let a = StopSignal::new();
        let b = a.clone();
        assert!(!b.is_stopped());
        a.stop();
        assert!(b.is_stopped());
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let mut source = CloseCounter { closes: 0 };
        {
            let mut guard = SourceGuard::new(&mut source);
            assert!(guard.next_frame().unwrap().is_none());
        }
        assert_eq!(source.closes, 1);
    }

    #[test]
    fn test_guard_closes_on_panic() {
        let mut source = CloseCounter { closes: 0 };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = SourceGuard::new(&mut source);
            panic!("inference blew up");
        }));
        assert!(result.is_err());
        assert_eq!(source.closes, 1);
    }
}
