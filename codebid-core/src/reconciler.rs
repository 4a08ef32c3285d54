use std::time::{Duration, Instant};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DRIFT_TOLERANCE: Duration = Duration::from_secs(2);

/// A running countdown: `seconds` left at `at`, falling with wall time and
/// never above `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    at: Instant,
    seconds: u32,
    ceiling: u32,
}

impl Countdown {
    pub fn new(seconds: u32, at: Instant) -> Self {
        Self {
            at,
            seconds,
            ceiling: seconds,
        }
    }

    pub fn capped(self, ceiling: u32) -> Self {
        Self {
            ceiling: self.ceiling.min(ceiling),
            ..self
        }
    }

    pub fn remaining_at(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.at).as_secs();
        let left = u64::from(self.seconds).saturating_sub(elapsed) as u32;
        left.min(self.ceiling)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDrift {
    FirstTick,
    Steady,
    /// The local clock disagreed with the tick cadence by more than the
    /// tolerance; the countdown was re-anchored to the server value.
    Resynced { drift: Duration },
}

/// Local countdown between `timer:update` ticks.
///
/// The server value is re-adopted on every tick whose cadence drifts past the
/// tolerance, so clients with different clock rates never diverge by more than
/// one tolerance window. Local decrements never accumulate across ticks.
#[derive(Debug, Clone)]
pub struct TimerReconciler {
    tick_interval: Duration,
    drift_tolerance: Duration,
    anchor: Option<Countdown>,
    last_tick_at: Option<Instant>,
}

impl TimerReconciler {
    pub fn new(tick_interval: Duration, drift_tolerance: Duration) -> Self {
        Self {
            tick_interval,
            drift_tolerance,
            anchor: None,
            last_tick_at: None,
        }
    }

    /// Starts a fresh countdown, e.g. on `round:started` or a snapshot.
    pub fn reseed(&mut self, seconds: u32, now: Instant) {
        self.anchor = Some(Countdown::new(seconds, now));
        self.last_tick_at = None;
    }

    pub fn stop(&mut self) {
        self.anchor = None;
        self.last_tick_at = None;
    }

    pub fn observe(&mut self, server_seconds: u32, now: Instant) -> TickDrift {
        let decision = match self.last_tick_at {
            None => TickDrift::FirstTick,
            Some(previous) => {
                let elapsed = now.saturating_duration_since(previous);
                let drift = if elapsed > self.tick_interval {
                    elapsed - self.tick_interval
                } else {
                    self.tick_interval - elapsed
                };
                if drift > self.drift_tolerance {
                    TickDrift::Resynced { drift }
                } else {
                    TickDrift::Steady
                }
            }
        };
        self.last_tick_at = Some(now);

        let keep_local = decision == TickDrift::Steady
            && self
                .remaining_at(now)
                .is_some_and(|local| local.abs_diff(server_seconds) <= self.tick_seconds());

        if !keep_local {
            self.anchor = Some(Countdown::new(server_seconds, now));
        }

        decision
    }

    /// Seconds left on the local countdown, or `None` when no countdown runs.
    pub fn remaining_at(&self, now: Instant) -> Option<u32> {
        self.anchor.map(|countdown| countdown.remaining_at(now))
    }

    pub fn countdown(&self) -> Option<Countdown> {
        self.anchor
    }

    fn tick_seconds(&self) -> u32 {
        self.tick_interval.as_secs().max(1) as u32
    }
}

impl Default for TimerReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL, DEFAULT_DRIFT_TOLERANCE)
    }
}
