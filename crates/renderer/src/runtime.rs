use std::time::{Duration, Instant};

/// Snapshot of the clock handed to the scene each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Monotonic seconds since the clock started.
    pub seconds: f32,
    /// Seconds since the previous sample.
    pub delta: f32,
    pub frame_index: u64,
}

/// Abstraction over where time values originate from.
pub trait TimeSource {
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    last: f32,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            last: 0.0,
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn sample(&mut self) -> TimeSample {
        let seconds = self.origin.elapsed().as_secs_f32();
        let sample = TimeSample {
            seconds,
            delta: (seconds - self.last).max(0.0),
            frame_index: self.frame,
        };
        self.last = seconds;
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Decides when the window loop should request the next redraw.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    interval: Option<Duration>,
    last_frame: Option<Instant>,
}

impl FrameScheduler {
    /// `target_fps` of `None`, zero or a non-finite value renders every redraw.
    pub fn new(target_fps: Option<f32>) -> Self {
        let interval = target_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps));
        Self {
            interval,
            last_frame: None,
        }
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        match (self.interval, self.last_frame) {
            (Some(interval), Some(last)) => now.saturating_duration_since(last) >= interval,
            _ => true,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        Some(self.last_frame? + self.interval?)
    }

    pub fn mark_rendered(&mut self, now: Instant) {
        self.last_frame = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncapped_scheduler_is_always_ready() {
        let mut scheduler = FrameScheduler::new(None);
        let now = Instant::now();
        assert!(scheduler.ready_for_frame(now));
        scheduler.mark_rendered(now);
        assert!(scheduler.ready_for_frame(now));
        assert!(scheduler.next_deadline().is_none());
    }

    #[test]
    fn capped_scheduler_waits_for_interval() {
        let mut scheduler = FrameScheduler::new(Some(4.0));
        let start = Instant::now();
        scheduler.mark_rendered(start);
        assert!(!scheduler.ready_for_frame(start + Duration::from_millis(125)));
        assert!(scheduler.ready_for_frame(start + Duration::from_millis(250)));
        let deadline = scheduler.next_deadline().expect("deadline");
        assert_eq!(deadline.duration_since(start), Duration::from_millis(250));
    }

    #[test]
    fn zero_fps_means_uncapped() {
        let mut scheduler = FrameScheduler::new(Some(0.0));
        let now = Instant::now();
        scheduler.mark_rendered(now);
        assert!(scheduler.ready_for_frame(now));
    }

    #[test]
    fn system_time_source_is_monotonic() {
        let mut source = SystemTimeSource::new();
        let first = source.sample();
        let second = source.sample();
        assert!(second.seconds >= first.seconds);
        assert!(second.delta >= 0.0);
        assert_eq!(second.frame_index, first.frame_index + 1);
    }
}
