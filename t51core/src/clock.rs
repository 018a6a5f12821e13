//! A monotonic clock abstraction so tick logic can be driven by wall time in production and
//! by a manually-advanced fake in tests, without either the client or server loop branching
//! on which one it has.

use std::cell::Cell;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

impl<'a, C: Clock + ?Sized> Clock for &'a C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Backed by `std::time::Instant`. Used by both binaries.
#[derive(Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to. `now()` returns a real `Instant` (there is no way
/// to fabricate one otherwise) offset from a fixed base, so tests can exercise tick logic
/// without sleeping.
pub struct FakeClock {
    base: Instant,
    offset: Cell<Duration>,
}

impl FakeClock {
    pub fn new() -> FakeClock {
        FakeClock {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, dt: Duration) {
        self.offset.set(self.offset.get() + dt);
    }
}

impl Default for FakeClock {
    fn default() -> FakeClock {
        FakeClock::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_only_advances_when_told() {
        let clock = FakeClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::from_millis(33));
        assert_eq!(clock.now(), t0 + Duration::from_millis(33));
    }
}
