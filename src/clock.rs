//! This module contains the type definitions for the time source used by the
//! budgeted scheduling decorators.
//!
//! # Cooperative Budgets
//!
//! Nothing in the core ever waits on a clock. The batching and iterative
//! deepening schedulers only read the current time when they are asked to
//! select a state or are told about an update, and compare it against their
//! budgets. Supplying a [`ManualClock`] therefore makes those decorators fully
//! deterministic.

use std::{cell::Cell, fmt::Debug, rc::Rc, time::Duration, time::Instant};

/// A dynamically dispatched [`Clock`] instance.
pub type DynClock = Rc<dyn Clock>;

/// The interface to a monotonic time source.
pub trait Clock
where
    Self: Debug,
{
    /// Gets the time elapsed since some fixed, clock-specific, epoch.
    #[must_use]
    fn now(&self) -> Duration;
}

/// A [`Clock`] that reads the monotonic system time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Constructs a new system clock whose epoch is the current instant.
    #[must_use]
    pub fn new() -> Self {
        let epoch = Instant::now();
        Self { epoch }
    }

    /// Wraps `self` into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> DynClock {
        Rc::new(self)
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// A [`Clock`] that only moves when it is told to.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// advance it after giving another to a scheduler.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    time: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Constructs a new manual clock reading zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.time.set(self.time.get() + by);
    }

    /// Sets the clock to read exactly `to`.
    pub fn set(&self, to: Duration) {
        self.time.set(to);
    }

    /// Wraps a handle to this clock into an [`Rc`].
    #[must_use]
    pub fn in_rc(&self) -> DynClock {
        Rc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.time.get()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::clock::{Clock, ManualClock, SystemClock};

    #[test]
    fn manual_clock_handles_share_time() {
        let clock = ManualClock::new();
        let handle = clock.in_rc();
        assert_eq!(handle.now(), Duration::ZERO);

        clock.advance(Duration::from_millis(1500));
        assert_eq!(handle.now(), Duration::from_millis(1500));

        clock.set(Duration::from_secs(1));
        assert_eq!(handle.now(), Duration::from_secs(1));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
