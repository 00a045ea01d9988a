// Implements the elapsed-time and encoder pulse counters shared between interrupt
// handlers and the control loop.

// Key Features:
// - Lock-free counters, incremented by the 1 ms timer and the encoder edge handlers
// - Single reader/resetter: the control loop snapshots and resets them
// - Separate window counters drained by the slip ratio estimator

// Detailed Operation:
// Producers only ever call on_tick()/on_pulse(); they never look at controller state.
// All counters are 32 bit atomics, so a read can never observe a torn value and no
// critical section is needed. The dwell counters (ticks, pulses) are zeroed by the
// control loop when the motion state machine enters a state that times its dwell.
// The window counters run independently so that state changes do not disturb the
// slip estimation windows.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::sync::atomic::{AtomicU32, Ordering};

/// Dwell counters as seen by one control cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    /// Timer ticks (1 ms) since the last reset
    pub ticks: u32,
    /// Encoder edges since the last reset
    pub pulses: u32,
}

impl Counters {
    pub const fn new(ticks: u32, pulses: u32) -> Self {
        Self { ticks, pulses }
    }
}

/// Which dwell counters to zero when a state is entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterReset {
    /// Both counters carry over
    Keep,
    /// Only the tick counter restarts, the pulse count carries over
    Ticks,
    /// Both counters restart
    All,
}

/// Counters fed by the timer and encoder interrupt sources.
pub struct EventCounters {
    ticks: AtomicU32,
    pulses: AtomicU32,
    window_ticks: AtomicU32,
    window_pulses: AtomicU32,
}

impl EventCounters {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
            pulses: AtomicU32::new(0),
            window_ticks: AtomicU32::new(0),
            window_pulses: AtomicU32::new(0),
        }
    }

    /// Timer period elapsed (interrupt context).
    #[inline(always)]
    pub fn on_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.window_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Encoder edge seen (interrupt context).
    #[inline(always)]
    pub fn on_pulse(&self) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
        self.window_pulses.fetch_add(1, Ordering::Relaxed);
    }

    /// Current dwell counters.
    #[inline(always)]
    pub fn snapshot(&self) -> Counters {
        Counters {
            ticks: self.ticks.load(Ordering::Relaxed),
            pulses: self.pulses.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the dwell counters selected by `reset`.
    pub fn reset(&self, reset: CounterReset) {
        match reset {
            CounterReset::Keep => {}
            CounterReset::Ticks => {
                self.ticks.store(0, Ordering::Relaxed);
            }
            CounterReset::All => {
                self.ticks.store(0, Ordering::Relaxed);
                self.pulses.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Ticks accumulated in the current estimator window.
    #[inline(always)]
    pub fn window_ticks(&self) -> u32 {
        self.window_ticks.load(Ordering::Relaxed)
    }

    /// Closes the estimator window, returning the pulses counted in it.
    pub fn take_window_pulses(&self) -> u32 {
        self.window_ticks.store(0, Ordering::Relaxed);
        self.window_pulses.swap(0, Ordering::Relaxed)
    }
}

impl Default for EventCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producers_only_increment() {
        let events = EventCounters::new();
        for _ in 0..250 {
            events.on_tick();
        }
        for _ in 0..30 {
            events.on_pulse();
        }
        assert_eq!(events.snapshot(), Counters::new(250, 30));
        assert_eq!(events.window_ticks(), 250);
    }

    #[test]
    fn reset_respects_carry_over() {
        let events = EventCounters::new();
        events.on_tick();
        events.on_tick();
        events.on_pulse();

        events.reset(CounterReset::Keep);
        assert_eq!(events.snapshot(), Counters::new(2, 1));

        events.reset(CounterReset::Ticks);
        assert_eq!(events.snapshot(), Counters::new(0, 1));

        events.on_tick();
        events.reset(CounterReset::All);
        assert_eq!(events.snapshot(), Counters::new(0, 0));
    }

    #[test]
    fn dwell_reset_leaves_estimator_window_alone() {
        let events = EventCounters::new();
        for _ in 0..5 {
            events.on_tick();
            events.on_pulse();
        }
        events.reset(CounterReset::All);
        assert_eq!(events.window_ticks(), 5);
        assert_eq!(events.take_window_pulses(), 5);
        assert_eq!(events.window_ticks(), 0);
        assert_eq!(events.take_window_pulses(), 0);
    }

    #[test]
    fn counters_are_shared_across_threads() {
        extern crate std;
        use std::sync::Arc;
        use std::thread;

        let events = Arc::new(EventCounters::new());
        let ticker = {
            let events = Arc::clone(&events);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    events.on_tick();
                }
            })
        };
        let encoder = {
            let events = Arc::clone(&events);
            thread::spawn(move || {
                for _ in 0..4_000 {
                    events.on_pulse();
                }
            })
        };
        ticker.join().unwrap();
        encoder.join().unwrap();
        assert_eq!(events.snapshot(), Counters::new(10_000, 4_000));
    }
}
