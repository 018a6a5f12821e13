//! A shared fixed-timestep driver underlying both the server's 30 Hz tick loop and the
//! client's simulation accumulator. Parameterized by `Clock` so it can be driven by a
//! `FakeClock` in tests instead of sleeping.

use crate::clock::Clock;
use std::time::{Duration, Instant};

const STATS_WINDOW: usize = 20;

/// A fixed-size rolling average, used for the tick loop's TPS/CPU-use stats.
#[derive(Debug)]
pub struct RollingWindow {
    samples: [f32; STATS_WINDOW],
    count: usize,
    next: usize,
}

impl RollingWindow {
    pub fn new() -> RollingWindow {
        RollingWindow {
            samples: [0.0; STATS_WINDOW],
            count: 0,
            next: 0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % STATS_WINDOW;
        self.count = (self.count + 1).min(STATS_WINDOW);
    }

    pub fn average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        self.samples[..self.count].iter().sum::<f32>() / self.count as f32
    }
}

impl Default for RollingWindow {
    fn default() -> RollingWindow {
        RollingWindow::new()
    }
}

/// Drives a fixed timestep of `1/tick_rate_hz` seconds. `begin_frame` accumulates wall time
/// elapsed since the previous call and reports how many fixed steps are now due; the caller
/// runs its tick body that many times (usually one, more under load, zero if called too
/// soon).
pub struct FixedTimestepDriver<C> {
    clock: C,
    dt: Duration,
    accumulator: Duration,
    last: Instant,
    tick_number: u64,
}

impl<C: Clock> FixedTimestepDriver<C> {
    pub fn new(clock: C, tick_rate_hz: u32) -> FixedTimestepDriver<C> {
        let dt = Duration::from_secs_f64(1.0 / tick_rate_hz as f64);
        let last = clock.now();
        FixedTimestepDriver {
            clock,
            dt,
            accumulator: Duration::ZERO,
            last,
            tick_number: 0,
        }
    }

    pub fn dt_secs(&self) -> f32 {
        self.dt.as_secs_f32()
    }

    pub fn tick_number(&self) -> u64 {
        self.tick_number
    }

    /// Accumulates wall time elapsed since the last call and drains it into fixed steps.
    /// Returns how many steps are due; call `advance_tick` once per step.
    pub fn begin_frame(&mut self) -> u32 {
        let now = self.clock.now();
        self.accumulator += now.duration_since(self.last);
        self.last = now;

        let mut steps = 0u32;
        while self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            steps += 1;
        }
        steps
    }

    /// Marks one fixed step as having run, returning the new tick number.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick_number += 1;
        self.tick_number
    }

    /// Fraction of a full `dt` left over in the accumulator; usable as a render
    /// interpolation alpha (rendering itself is out of scope here).
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.dt.as_secs_f32()
    }

    /// How long a frame that started at `frame_started` should sleep to hit the target
    /// cadence, or the overrun amount if it already ran long.
    pub fn remaining_or_overrun(&self, frame_started: Instant) -> Result<Duration, Duration> {
        let elapsed = self.clock.now().duration_since(frame_started);
        if elapsed < self.dt {
            Ok(self.dt - elapsed)
        } else {
            Err(elapsed - self.dt)
        }
    }
}
