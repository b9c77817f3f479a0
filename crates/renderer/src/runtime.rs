use std::time::{Duration, Instant};

/// Abstraction over where the `u_time` value originates from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Seconds elapsed for the frame about to be drawn.
    fn seconds(&mut self) -> f32;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Creates a system time source initialised to `Instant::now()`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
    }

    fn seconds(&mut self) -> f32 {
        self.origin.elapsed().as_secs_f32()
    }
}

/// Time source that always reports a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self { time }
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {}

    fn seconds(&mut self) -> f32 {
        self.time
    }
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Gates redraws to an optional FPS cap.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    next_frame: Option<Instant>,
}

impl FramePacer {
    /// `None`, zero, negative, or non-finite caps disable pacing.
    pub fn new(target_fps: Option<f32>) -> Self {
        let interval = target_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps));
        Self {
            interval,
            next_frame: None,
        }
    }

    pub fn is_capped(&self) -> bool {
        self.interval.is_some()
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        self.next_frame.map_or(true, |deadline| now >= deadline)
    }

    pub fn mark_rendered(&mut self, now: Instant) {
        if let Some(interval) = self.interval {
            // Schedule from the previous deadline so the cadence does not drift, unless we
            // have fallen a whole interval behind.
            let base = match self.next_frame {
                Some(deadline) if now < deadline + interval => deadline,
                _ => now,
            };
            self.next_frame = Some(base + interval);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_source_is_stable() {
        let mut source = FixedTimeSource::new(2.5);
        assert_eq!(source.seconds(), 2.5);
        source.reset();
        assert_eq!(source.seconds(), 2.5);
    }

    #[test]
    fn system_source_is_monotonic() {
        let mut source = SystemTimeSource::new();
        let first = source.seconds();
        let second = source.seconds();
        assert!(second >= first);
    }

    #[test]
    fn uncapped_pacer_is_always_ready() {
        let mut pacer = FramePacer::new(None);
        let now = Instant::now();
        assert!(!pacer.is_capped());
        pacer.mark_rendered(now);
        assert!(pacer.ready_for_frame(now));
        assert!(pacer.next_deadline().is_none());
        assert!(!FramePacer::new(Some(0.0)).is_capped());
    }

    #[test]
    fn capped_pacer_waits_for_interval() {
        let mut pacer = FramePacer::new(Some(10.0));
        let start = Instant::now();
        assert!(pacer.ready_for_frame(start));
        pacer.mark_rendered(start);
        assert!(!pacer.ready_for_frame(start + Duration::from_millis(50)));
        assert!(pacer.ready_for_frame(start + Duration::from_millis(100)));
        assert_eq!(pacer.next_deadline(), Some(start + Duration::from_millis(100)));
    }
}
