// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::rules::program;
use super::ControlState;
use crate::config::Config;
use crate::drive::{clamp_steer, SpeedCommand};
use crate::sensors::SensorMask;
use crate::timing::{CounterReset, Counters};

/// Outcome of one evaluation of a state's program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Decision {
    /// State for the next cycle, equal to the current one when no transition happened
    pub next: ControlState,
    /// New steering angle (bias applied, clamped), `None` keeps the previous one
    pub steer: Option<i16>,
    /// New speed command, `None` keeps the previous one
    pub speed: Option<SpeedCommand>,
    /// Dwell counters to restart
    pub reset: CounterReset,
}

impl Decision {
    const fn hold(state: ControlState) -> Self {
        Self {
            next: state,
            steer: None,
            speed: None,
            reset: CounterReset::Keep,
        }
    }
}

/// Evaluates the program of `state` for one cycle.
///
/// Pure: the same inputs always give the same decision.
pub fn transition(
    state: ControlState,
    sensors: SensorMask,
    counters: Counters,
    config: &Config,
) -> Decision {
    let mut decision = Decision::hold(state);

    'stages: for stage in program(state) {
        let Some(rule) = stage
            .iter()
            .find(|rule| rule.applies(sensors, counters, config))
        else {
            continue;
        };

        let action = rule.action;
        if let Some(steer) = action.steer {
            decision.steer = Some(clamp_steer(steer.angle(config.steer_bias)));
        }
        if let Some(speed) = action.speed {
            decision.speed = Some(speed);
        }
        if let Some(next) = action.next {
            if next != state {
                decision.next = next;
                decision.reset = next.entry_reset();
            }
            break 'stages;
        }
    }

    decision
}

/// Holds the active state and the last commanded steering and speed.
pub struct MotionStateMachine {
    state: ControlState,
    steer: i16,
    speed: SpeedCommand,
}

impl MotionStateMachine {
    /// Starts tracking the line with centred steering and stopped wheels.
    pub const fn new() -> Self {
        Self {
            state: ControlState::StraightLine,
            steer: 0,
            speed: SpeedCommand::STOP,
        }
    }

    /// Forces `state`, returning the counters its entry restarts.
    pub fn enter(&mut self, state: ControlState) -> CounterReset {
        log_debug!("MOTION: Entering {}", state.code());
        self.state = state;
        state.entry_reset()
    }

    /// Runs one control cycle and returns the counters the caller must restart.
    pub fn step(&mut self, sensors: SensorMask, counters: Counters, config: &Config) -> CounterReset {
        let decision = transition(self.state, sensors, counters, config);

        if let Some(steer) = decision.steer {
            self.steer = steer;
        }
        if let Some(speed) = decision.speed {
            self.speed = speed;
        }
        if decision.next != self.state {
            log_debug!(
                "MOTION: {} -> {} (sensors {:#b}, ticks {}, pulses {})",
                self.state.code(),
                decision.next.code(),
                sensors.bits(),
                counters.ticks,
                counters.pulses
            );
            self.state = decision.next;
        }
        decision.reset
    }

    #[inline(always)]
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Last steering angle, within the steering limit.
    #[inline(always)]
    pub fn steering(&self) -> i16 {
        self.steer
    }

    #[inline(always)]
    pub fn speed(&self) -> SpeedCommand {
        self.speed
    }
}

impl Default for MotionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
