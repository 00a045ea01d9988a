// Motion state machine of the line follower.
//
// Key Features:
// - One tagged state per driving behaviour, each with a numeric diagnostic code
// - Per-state ordered rule tables (masked sensor patterns + dwell limits)
// - Pure transition function, the stateful wrapper only holds the last command
//
// Detailed Operation:
// Every control cycle the current state's program is evaluated against the fresh
// sensor mask and the dwell counters. A program is a list of stages; in every stage
// the first matching rule applies its action. An action that names a next state ends
// the cycle, otherwise the next stage is evaluated. Steering and speed that no rule
// touched keep their previous values, so an unknown sensor mask holds the last
// command. When a state is entered its CounterReset tells the owner of the event
// counters which dwell counters to restart.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

pub mod machine;
pub mod rules;

pub use machine::{transition, Decision, MotionStateMachine};
pub use rules::{Action, Dwell, Rule, SensorTest, Steer, TickLimit};

use crate::timing::CounterReset;

/// Behaviour currently driving the car. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlState {
    /// Following the line, proportional steering from the centre sensors
    StraightLine,
    /// Line ran off to the right, hard right correction
    LargeRightDeviation,
    /// Line ran off to the left, hard left correction
    LargeLeftDeviation,
    /// Cross line seen: brake by reversing
    IntersectionApproach,
    /// Waiting for the car to stop
    IntersectionBraking,
    /// Creeping towards the corner until its side is known
    IntersectionTurnDecision,
    /// Corner is on the left: full lock and spin
    IntersectionTurnLeft,
    /// Corner is on the right: full lock and spin
    IntersectionTurnRight,
    IntersectionTurnLeftEntering,
    IntersectionTurnLeftSettling,
    IntersectionTurnRightEntering,
    IntersectionTurnRightSettling,
    /// Left half line seen: drive on to the lane change point
    LaneChangeLeft1,
    /// Steer into the left lane
    LaneChangeLeft2,
    /// Wait for the new line
    LaneChangeLeft3,
    LaneChangeRight1,
    LaneChangeRight2,
    LaneChangeRight3,
    /// Line lost: drive straight on for a short while
    LineLostRecovery1,
    /// Track whatever line shows up, give up when none does
    LineLostRecovery2,
    /// Search with the outer sensors until an inner one finds the line
    LineLostRecovery3,
}

impl ControlState {
    pub const ALL: [ControlState; 21] = [
        ControlState::StraightLine,
        ControlState::LargeRightDeviation,
        ControlState::LargeLeftDeviation,
        ControlState::IntersectionApproach,
        ControlState::IntersectionBraking,
        ControlState::IntersectionTurnDecision,
        ControlState::IntersectionTurnLeft,
        ControlState::IntersectionTurnRight,
        ControlState::IntersectionTurnLeftEntering,
        ControlState::IntersectionTurnLeftSettling,
        ControlState::IntersectionTurnRightEntering,
        ControlState::IntersectionTurnRightSettling,
        ControlState::LaneChangeLeft1,
        ControlState::LaneChangeLeft2,
        ControlState::LaneChangeLeft3,
        ControlState::LaneChangeRight1,
        ControlState::LaneChangeRight2,
        ControlState::LaneChangeRight3,
        ControlState::LineLostRecovery1,
        ControlState::LineLostRecovery2,
        ControlState::LineLostRecovery3,
    ];

    /// Two digit code shown on the diagnostic display.
    pub const fn code(self) -> u8 {
        match self {
            ControlState::StraightLine => 10,
            ControlState::LargeRightDeviation => 11,
            ControlState::LargeLeftDeviation => 12,
            ControlState::IntersectionApproach => 21,
            ControlState::IntersectionBraking => 22,
            ControlState::IntersectionTurnDecision => 23,
            ControlState::IntersectionTurnLeft => 26,
            ControlState::IntersectionTurnRight => 27,
            ControlState::IntersectionTurnLeftEntering => 31,
            ControlState::IntersectionTurnLeftSettling => 32,
            ControlState::IntersectionTurnRightEntering => 41,
            ControlState::IntersectionTurnRightSettling => 42,
            ControlState::LaneChangeLeft1 => 51,
            ControlState::LaneChangeLeft2 => 52,
            ControlState::LaneChangeLeft3 => 53,
            ControlState::LaneChangeRight1 => 61,
            ControlState::LaneChangeRight2 => 62,
            ControlState::LaneChangeRight3 => 63,
            ControlState::LineLostRecovery1 => 71,
            ControlState::LineLostRecovery2 => 72,
            ControlState::LineLostRecovery3 => 73,
        }
    }

    /// State for a diagnostic code, `None` for codes no state uses.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|state| state.code() == code)
    }

    /// Dwell counters restarted when this state is entered from another one.
    pub const fn entry_reset(self) -> CounterReset {
        match self {
            ControlState::StraightLine
            | ControlState::LargeRightDeviation
            | ControlState::LargeLeftDeviation
            | ControlState::IntersectionApproach => CounterReset::Keep,

            // Turn sequence times on ticks only, the pulse count runs on
            ControlState::IntersectionTurnLeft
            | ControlState::IntersectionTurnRight
            | ControlState::IntersectionTurnLeftEntering
            | ControlState::IntersectionTurnLeftSettling
            | ControlState::IntersectionTurnRightEntering
            | ControlState::IntersectionTurnRightSettling
            | ControlState::LineLostRecovery2 => CounterReset::Ticks,

            ControlState::IntersectionBraking
            | ControlState::IntersectionTurnDecision
            | ControlState::LaneChangeLeft1
            | ControlState::LaneChangeLeft2
            | ControlState::LaneChangeLeft3
            | ControlState::LaneChangeRight1
            | ControlState::LaneChangeRight2
            | ControlState::LaneChangeRight3
            | ControlState::LineLostRecovery1
            | ControlState::LineLostRecovery3 => CounterReset::All,
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        ControlState::StraightLine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_round_trip() {
        for state in ControlState::ALL {
            assert_eq!(ControlState::from_code(state.code()), Some(state));
        }
        for (i, a) in ControlState::ALL.iter().enumerate() {
            for b in &ControlState::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn unknown_code_has_no_state() {
        assert_eq!(ControlState::from_code(0), None);
        assert_eq!(ControlState::from_code(13), None);
        assert_eq!(ControlState::from_code(99), None);
    }

    #[test]
    fn dwell_timed_states_restart_both_counters() {
        assert_eq!(ControlState::IntersectionBraking.entry_reset(), CounterReset::All);
        assert_eq!(ControlState::LaneChangeLeft1.entry_reset(), CounterReset::All);
        assert_eq!(ControlState::IntersectionTurnLeftEntering.entry_reset(), CounterReset::Ticks);
        assert_eq!(ControlState::StraightLine.entry_reset(), CounterReset::Keep);
    }
}
