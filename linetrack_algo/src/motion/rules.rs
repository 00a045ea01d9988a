// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::ControlState::{self, *};
use crate::config::{Config, WINDOW_SCALE};
use crate::drive::SpeedCommand;
use crate::sensors::SensorMask;
use crate::timing::Counters;

/// Steering part of an action. Tracking corrections get the configured bias added
/// on the side they steer to, fixed manoeuvres use the exact angle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Steer {
    Exact(i16),
    /// `angle + bias`
    Right(i16),
    /// `-angle - bias`
    Left(i16),
}

impl Steer {
    pub const CENTER: Steer = Steer::Exact(0);

    #[inline]
    pub const fn angle(self, bias: i16) -> i16 {
        match self {
            Steer::Exact(angle) => angle,
            Steer::Right(angle) => angle.saturating_add(bias),
            Steer::Left(angle) => (-angle).saturating_sub(bias),
        }
    }
}

/// Condition on the sensor mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorTest {
    Always,
    /// Whole mask equals the pattern
    Is(u8),
    /// `(mask & .0) == .1`
    Masked(u8, u8),
    /// Any of the (mask, pattern) pairs matches
    AnyOf(&'static [(u8, u8)]),
    /// Any of the bits is set
    AnyBit(u8),
}

impl SensorTest {
    pub fn holds(&self, sensors: SensorMask) -> bool {
        match *self {
            SensorTest::Always => true,
            SensorTest::Is(pattern) => sensors.bits() == pattern,
            SensorTest::Masked(mask, pattern) => sensors.matches(mask, pattern),
            SensorTest::AnyOf(pairs) => pairs
                .iter()
                .any(|&(mask, pattern)| sensors.matches(mask, pattern)),
            SensorTest::AnyBit(mask) => sensors.any(mask),
        }
    }
}

/// Tick threshold of a dwell condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickLimit {
    /// More than this many ticks
    Over(u32),
    /// Past the braking window derived from the ratio
    Brake,
    /// Past the lane change settling window derived from the ratio
    Settle,
}

impl TickLimit {
    fn exceeded(self, ticks: u32, config: &Config) -> bool {
        let scaled = ticks as i64 * WINDOW_SCALE;
        match self {
            TickLimit::Over(limit) => ticks > limit,
            TickLimit::Brake => scaled > config.brake_window_scaled(),
            TickLimit::Settle => scaled > config.settle_window_scaled(),
        }
    }
}

/// Time spent in a state: passes once the ticks OR the pulses are over their limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dwell {
    pub ticks: TickLimit,
    pub pulses: Option<u32>,
}

impl Dwell {
    pub const fn ticks(limit: TickLimit) -> Self {
        Self {
            ticks: limit,
            pulses: None,
        }
    }

    pub const fn or_pulses(limit: TickLimit, pulses: u32) -> Self {
        Self {
            ticks: limit,
            pulses: Some(pulses),
        }
    }

    pub fn elapsed(&self, counters: Counters, config: &Config) -> bool {
        let pulses_over = match self.pulses {
            Some(limit) => counters.pulses > limit,
            None => false,
        };
        pulses_over || self.ticks.exceeded(counters.ticks, config)
    }
}

/// What a matching rule does. Fields left at `None` keep their previous value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Action {
    pub steer: Option<Steer>,
    pub speed: Option<SpeedCommand>,
    pub next: Option<ControlState>,
}

/// One table entry: sensor condition, optional dwell condition and action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rule {
    pub sensors: SensorTest,
    pub dwell: Option<Dwell>,
    pub action: Action,
}

impl Rule {
    pub const fn when(sensors: SensorTest) -> Self {
        Self {
            sensors,
            dwell: None,
            action: Action {
                steer: None,
                speed: None,
                next: None,
            },
        }
    }

    pub const fn after(mut self, dwell: Dwell) -> Self {
        self.dwell = Some(dwell);
        self
    }

    pub const fn steer(mut self, steer: Steer) -> Self {
        self.action.steer = Some(steer);
        self
    }

    pub const fn speed(mut self, left: i8, right: i8) -> Self {
        self.action.speed = Some(SpeedCommand::new(left, right));
        self
    }

    pub const fn goto(mut self, next: ControlState) -> Self {
        self.action.next = Some(next);
        self
    }

    pub fn applies(&self, sensors: SensorMask, counters: Counters, config: &Config) -> bool {
        let dwell_ok = match self.dwell {
            Some(dwell) => dwell.elapsed(counters, config),
            None => true,
        };
        dwell_ok && self.sensors.holds(sensors)
    }
}

/// Rules evaluated first-match-wins.
pub type Stage = &'static [Rule];

/// Ordered stages of the given state.
pub fn program(state: ControlState) -> &'static [Stage] {
    match state {
        StraightLine => &[STRAIGHT_GUARDS, TRACKING],
        LargeRightDeviation => &[RIGHT_DEVIATION],
        LargeLeftDeviation => &[LEFT_DEVIATION],
        IntersectionApproach => &[APPROACH],
        IntersectionBraking => &[BRAKING],
        IntersectionTurnDecision => &[CORNER_LEFT, CORNER_RIGHT, NO_LINE_AHEAD, CREEP],
        IntersectionTurnLeft => &[TURN_LEFT],
        IntersectionTurnRight => &[TURN_RIGHT],
        IntersectionTurnLeftEntering => &[TURN_LEFT_ENTERING],
        IntersectionTurnLeftSettling => &[TURN_LEFT_SETTLING],
        IntersectionTurnRightEntering => &[TURN_RIGHT_ENTERING],
        IntersectionTurnRightSettling => &[TURN_RIGHT_SETTLING],
        LaneChangeLeft1 => &[LANE_LEFT_ABORT, FULL_SPEED, LANE_LEFT_RUN_OUT],
        LaneChangeLeft2 => &[LANE_LEFT_STEER],
        LaneChangeLeft3 => &[LANE_LEFT_SETTLE],
        LaneChangeRight1 => &[LANE_RIGHT_ABORT, FULL_SPEED, LANE_RIGHT_RUN_OUT],
        LaneChangeRight2 => &[LANE_RIGHT_STEER],
        LaneChangeRight3 => &[LANE_RIGHT_SETTLE],
        LineLostRecovery1 => &[FULL_SPEED, LOST_RUN_OUT],
        LineLostRecovery2 => &[LOST_NOTHING_SEEN, TRACKING],
        LineLostRecovery3 => &[FULL_SPEED, SEARCH_LEFT_EDGE, SEARCH_RIGHT_EDGE, SEARCH_FOUND],
    }
}

// ################################ PATTERNS ##########################################

const CROSS_LINE: &[(u8, u8)] = &[(0b1111_1111, 0b1111_1111), (0b0111_1110, 0b0111_1110)];
const LEFT_HALF_LINE: &[(u8, u8)] = &[(0b1111_0000, 0b1111_0000), (0b1111_1000, 0b1111_1000)];
const RIGHT_HALF_LINE: &[(u8, u8)] = &[(0b0000_1111, 0b0000_1111), (0b0001_1111, 0b0001_1111)];

const LEFT_CORNER: &[(u8, u8)] = &[
    (0b1111_1000, 0b1111_1000),
    (0b1111_0000, 0b1111_0000),
    (0b1110_0000, 0b1110_0000),
    (0b1111_1100, 0b1111_1100),
];
const RIGHT_CORNER: &[(u8, u8)] = &[
    (0b0001_1111, 0b0001_1111),
    (0b0000_0111, 0b0000_0111),
    (0b0000_1111, 0b0000_1111),
    (0b0011_1111, 0b0011_1111),
];

const LANE_LEFT_CROSSING: &[(u8, u8)] = &[
    (0b0000_0111, 0b0000_0111),
    (0b0000_1111, 0b0000_1111),
    (0b0001_1111, 0b0001_1111),
];
// First pair listed twice, kept as two entries
const LANE_RIGHT_CROSSING: &[(u8, u8)] = &[
    (0b1110_0000, 0b1110_0000),
    (0b1110_0000, 0b1110_0000),
    (0b1111_1000, 0b1111_1000),
];

const TRACKING_MASK: u8 = 0b0111_1110;

const fn track(pattern: u8) -> Rule {
    Rule::when(SensorTest::Masked(TRACKING_MASK, pattern))
}

// ################################# TABLES ###########################################

const STRAIGHT_GUARDS: Stage = &[
    Rule::when(SensorTest::AnyOf(CROSS_LINE)).goto(IntersectionApproach),
    Rule::when(SensorTest::AnyOf(LEFT_HALF_LINE)).goto(LaneChangeLeft1),
    Rule::when(SensorTest::AnyOf(RIGHT_HALF_LINE)).goto(LaneChangeRight1),
];

const TRACKING: Stage = &[
    track(0b0111_1110),
    track(0b0001_1000).steer(Steer::CENTER).speed(100, 100),
    // line right of centre
    track(0b0001_1100).speed(100, 90).steer(Steer::Right(9)),
    track(0b0000_1000).speed(100, 90).steer(Steer::Right(9)),
    track(0b0000_1100).speed(100, 80).steer(Steer::Right(17)),
    track(0b0000_1110).speed(100, 70).steer(Steer::Right(31)),
    track(0b0000_0100).speed(100, 70).steer(Steer::Right(31)),
    track(0b0000_0110).speed(100, 60).steer(Steer::Right(50)),
    track(0b0000_0010)
        .speed(100, 40)
        .steer(Steer::Right(75))
        .goto(LargeRightDeviation),
    // line left of centre
    track(0b0011_1000).speed(90, 100).steer(Steer::Left(9)),
    track(0b0001_0000).speed(90, 100).steer(Steer::Left(9)),
    track(0b0011_0000).speed(80, 100).steer(Steer::Left(17)),
    track(0b0111_0000).speed(70, 100).steer(Steer::Left(31)),
    track(0b0010_0000).speed(70, 100).steer(Steer::Left(31)),
    track(0b0110_0000).speed(60, 100).steer(Steer::Left(50)),
    track(0b0100_0000)
        .speed(40, 100)
        .steer(Steer::Left(75))
        .goto(LargeLeftDeviation),
];

const RIGHT_DEVIATION: Stage = &[
    Rule::when(SensorTest::Masked(0b1100_1100, 0b1100_0000))
        .speed(80, -10)
        .steer(Steer::Right(95)),
    Rule::when(SensorTest::Masked(0b1100_1100, 0b1000_0000))
        .speed(80, 5)
        .steer(Steer::Right(80)),
    Rule::when(SensorTest::Masked(0b1100_1100, 0b0000_0000))
        .speed(80, 10)
        .steer(Steer::Right(68)),
    Rule::when(SensorTest::Masked(0b1100_1100, 0b0000_0100))
        .speed(80, 15)
        .steer(Steer::Right(50)),
    Rule::when(SensorTest::Masked(0b1100_1100, 0b0000_1100))
        .speed(80, 20)
        .steer(Steer::Right(42))
        .goto(StraightLine),
];

const LEFT_DEVIATION: Stage = &[
    Rule::when(SensorTest::Masked(0b0011_0011, 0b0000_0011))
        .speed(-10, 80)
        .steer(Steer::Left(95)),
    Rule::when(SensorTest::Masked(0b0011_0011, 0b0000_0001))
        .speed(5, 80)
        .steer(Steer::Left(80)),
    Rule::when(SensorTest::Masked(0b0011_0011, 0b0000_0000))
        .speed(10, 80)
        .steer(Steer::Left(68)),
    Rule::when(SensorTest::Masked(0b0011_0011, 0b0010_0000))
        .speed(15, 80)
        .steer(Steer::Left(50)),
    Rule::when(SensorTest::Masked(0b0011_0011, 0b0011_0000))
        .speed(20, 80)
        .steer(Steer::Left(42))
        .goto(StraightLine),
];

const APPROACH: Stage = &[Rule::when(SensorTest::Always)
    .steer(Steer::CENTER)
    .speed(-30, -30)
    .goto(IntersectionBraking)];

const BRAKING: Stage = &[Rule::when(SensorTest::Always)
    .after(Dwell::or_pulses(TickLimit::Brake, 20))
    .speed(0, 0)
    .goto(IntersectionTurnDecision)];

const CORNER_DWELL: Dwell = Dwell::or_pulses(TickLimit::Over(150), 85);

const CORNER_LEFT: Stage = &[Rule::when(SensorTest::AnyOf(LEFT_CORNER))
    .after(CORNER_DWELL)
    .goto(IntersectionTurnLeft)];

const CORNER_RIGHT: Stage = &[Rule::when(SensorTest::AnyOf(RIGHT_CORNER))
    .after(CORNER_DWELL)
    .goto(IntersectionTurnRight)];

const NO_LINE_AHEAD: Stage = &[Rule::when(SensorTest::Is(0))
    .steer(Steer::CENTER)
    .speed(100, 100)
    .goto(LineLostRecovery3)];

// Steering only, speed is left as the braking set it
const CREEP: Stage = &[
    Rule::when(SensorTest::Is(0b0001_1000)).steer(Steer::CENTER),
    Rule::when(SensorTest::Is(0b0000_1000)).steer(Steer::Right(8)),
    Rule::when(SensorTest::Is(0b0000_1100)).steer(Steer::Right(10)),
    Rule::when(SensorTest::Is(0b0000_0100)).steer(Steer::Right(13)),
    Rule::when(SensorTest::Is(0b0000_0110)).steer(Steer::Right(18)),
    Rule::when(SensorTest::Is(0b0000_0010)).steer(Steer::Right(18)),
    Rule::when(SensorTest::Is(0b0001_0000)).steer(Steer::Left(8)),
    Rule::when(SensorTest::Is(0b0011_0000)).steer(Steer::Left(10)),
    Rule::when(SensorTest::Is(0b0010_0000)).steer(Steer::Left(13)),
    Rule::when(SensorTest::Is(0b0110_0000)).steer(Steer::Left(18)),
    Rule::when(SensorTest::Is(0b0100_0000)).steer(Steer::Left(18)),
];

const TURN_LEFT: Stage = &[Rule::when(SensorTest::Always)
    .steer(Steer::Left(150))
    .speed(-60, 60)
    .goto(IntersectionTurnLeftEntering)];

const TURN_RIGHT: Stage = &[Rule::when(SensorTest::Always)
    .steer(Steer::Right(150))
    .speed(60, -60)
    .goto(IntersectionTurnRightEntering)];

const SPIN_DWELL: Dwell = Dwell::ticks(TickLimit::Over(200));

const TURN_LEFT_ENTERING: Stage = &[Rule::when(SensorTest::Always)
    .after(SPIN_DWELL)
    .goto(IntersectionTurnLeftSettling)];

const TURN_RIGHT_ENTERING: Stage = &[Rule::when(SensorTest::Always)
    .after(SPIN_DWELL)
    .goto(IntersectionTurnRightSettling)];

const TURN_LEFT_SETTLING: Stage =
    &[Rule::when(SensorTest::Masked(0b1110_0111, 0b0010_0000)).goto(StraightLine)];

const TURN_RIGHT_SETTLING: Stage =
    &[Rule::when(SensorTest::Masked(0b1110_0111, 0b0000_0100)).goto(StraightLine)];

const FULL_SPEED: Stage = &[Rule::when(SensorTest::Always).speed(100, 100)];

// At least 25 pulses or 120 ticks
const LANE_RUN_OUT: Dwell = Dwell::or_pulses(TickLimit::Over(119), 24);

const LANE_LEFT_ABORT: Stage =
    &[Rule::when(SensorTest::AnyOf(LANE_LEFT_CROSSING)).goto(IntersectionApproach)];

const LANE_LEFT_RUN_OUT: Stage = &[Rule::when(SensorTest::Always)
    .after(LANE_RUN_OUT)
    .goto(LaneChangeLeft2)];

const LANE_LEFT_STEER: Stage = &[Rule::when(SensorTest::Always)
    .steer(Steer::Exact(-35))
    .speed(80, 100)
    .goto(LaneChangeLeft3)];

const LANE_SETTLE: Dwell = Dwell::or_pulses(TickLimit::Settle, 100);

const LANE_LEFT_SETTLE: Stage = &[Rule::when(SensorTest::Masked(0b0011_0000, 0b0011_0000))
    .after(LANE_SETTLE)
    .goto(StraightLine)];

const LANE_RIGHT_ABORT: Stage =
    &[Rule::when(SensorTest::AnyOf(LANE_RIGHT_CROSSING)).goto(IntersectionApproach)];

const LANE_RIGHT_RUN_OUT: Stage = &[Rule::when(SensorTest::Always)
    .after(LANE_RUN_OUT)
    .goto(LaneChangeRight2)];

const LANE_RIGHT_STEER: Stage = &[Rule::when(SensorTest::Always)
    .steer(Steer::Exact(35))
    .speed(100, 80)
    .goto(LaneChangeRight3)];

const LANE_RIGHT_SETTLE: Stage = &[Rule::when(SensorTest::Masked(0b0011_0000, 0b0011_0000))
    .after(LANE_SETTLE)
    .goto(StraightLine)];

const LOST_RUN_OUT: Stage = &[Rule::when(SensorTest::Always)
    .after(Dwell::or_pulses(TickLimit::Over(100), 10))
    .goto(LineLostRecovery2)];

const LOST_NOTHING_SEEN: Stage = &[Rule::when(SensorTest::Is(0))
    .steer(Steer::CENTER)
    .speed(100, 100)
    .goto(LineLostRecovery3)];

const SEARCH_LEFT_EDGE: Stage = &[Rule::when(SensorTest::AnyBit(0b1000_0000)).steer(Steer::Right(20))];

const SEARCH_RIGHT_EDGE: Stage = &[Rule::when(SensorTest::AnyBit(0b0000_0001)).steer(Steer::Left(20))];

const SEARCH_FOUND: Stage = &[Rule::when(SensorTest::AnyBit(0b0111_1110)).goto(StraightLine)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_is_added_on_the_steering_side() {
        assert_eq!(Steer::Right(75).angle(10), 85);
        assert_eq!(Steer::Left(75).angle(10), -85);
        assert_eq!(Steer::Exact(-35).angle(10), -35);
    }

    #[test]
    fn sensor_tests_match_their_patterns() {
        let s = SensorMask(0b1111_1000);
        assert!(SensorTest::Always.holds(s));
        assert!(SensorTest::Is(0b1111_1000).holds(s));
        assert!(SensorTest::Masked(0b1111_0000, 0b1111_0000).holds(s));
        assert!(SensorTest::AnyOf(LEFT_HALF_LINE).holds(s));
        assert!(!SensorTest::AnyOf(RIGHT_HALF_LINE).holds(s));
        assert!(SensorTest::AnyBit(0b1000_0000).holds(s));
        assert!(!SensorTest::AnyBit(0b0000_0111).holds(s));
    }

    #[test]
    fn dwell_passes_on_either_counter() {
        let config = Config::new();
        let dwell = Dwell::or_pulses(TickLimit::Over(150), 85);
        assert!(!dwell.elapsed(Counters::new(150, 85), &config));
        assert!(dwell.elapsed(Counters::new(151, 0), &config));
        assert!(dwell.elapsed(Counters::new(0, 86), &config));
    }

    #[test]
    fn derived_windows_compare_fractional_ticks() {
        // Default braking window is 27.5 ticks
        let config = Config::new();
        let brake = Dwell::ticks(TickLimit::Brake);
        assert!(!brake.elapsed(Counters::new(27, 0), &config));
        assert!(brake.elapsed(Counters::new(28, 0), &config));

        // Default settling window is 257.5 ticks
        let settle = Dwell::ticks(TickLimit::Settle);
        assert!(!settle.elapsed(Counters::new(257, 0), &config));
        assert!(settle.elapsed(Counters::new(258, 0), &config));
    }

    #[test]
    fn every_state_has_a_program() {
        for state in ControlState::ALL {
            assert!(!program(state).is_empty());
            assert!(program(state).iter().all(|stage| !stage.is_empty()));
        }
    }

    #[test]
    fn duplicate_crossing_pair_is_kept() {
        assert_eq!(LANE_RIGHT_CROSSING.len(), 3);
        assert_eq!(LANE_RIGHT_CROSSING[0], LANE_RIGHT_CROSSING[1]);
    }
}
