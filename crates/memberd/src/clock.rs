//! Protocol clocks
//!
//! All membership timing is expressed in ticks. The engine only ever asks
//! for "now"; it never sleeps.

use member_gossip_core::Tick;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic source of protocol time
pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Clock advanced explicitly, shared by every node of a simulation
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Tick) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move time forward and return the new value
    pub fn advance(&self, ticks: Tick) -> Tick {
        self.now.fetch_add(ticks, Ordering::SeqCst) + ticks
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Tick {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall-clock ticks elapsed since construction
#[derive(Debug, Clone)]
pub struct TickClock {
    origin: Instant,
    tick: Duration,
}

impl TickClock {
    pub fn new(tick: Duration) -> Self {
        Self {
            origin: Instant::now(),
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }
}

impl Clock for TickClock {
    fn now(&self) -> Tick {
        (self.origin.elapsed().as_nanos() / self.tick.as_nanos()) as Tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(3);
        assert_eq!(clock.now(), 3);
        assert_eq!(clock.advance(2), 5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn test_tick_clock_monotonic() {
        let clock = TickClock::new(Duration::from_millis(5));
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(12));
        let second = clock.now();
        assert!(second >= first + 1);
    }

    #[test]
    fn test_zero_tick_clamped() {
        let clock = TickClock::new(Duration::ZERO);
        assert_eq!(clock.tick(), Duration::from_millis(1));
    }
}
