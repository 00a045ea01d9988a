// Implements the mapping from motion commands to actuator set points.
//
// Key Features:
// - Steering angle clamping and conversion to servo compare units
// - Per-wheel speed commands in percent with direction and magnitude split
// - Slip compensation ratio applied to the commanded speeds
// - Ratio estimator comparing encoder pulses per window with a velocity target

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use crate::timing::EventCounters;

/// Steering command range, in servo units either side of centre.
pub const STEER_LIMIT: i16 = 135;
/// Servo compare value for straight wheels.
pub const SERVO_CENTER: u16 = 3150;
/// Servo compare units per steering unit.
pub const SERVO_STEP: i16 = 4;
/// Servo compare period the positions refer to.
pub const SERVO_PERIOD: u16 = 20000;
/// Speed command range in percent.
pub const SPEED_LIMIT: i8 = 100;

/// Clamps a steering angle to ±[`STEER_LIMIT`].
#[inline(always)]
pub const fn clamp_steer(angle: i16) -> i16 {
    if angle > STEER_LIMIT {
        STEER_LIMIT
    } else if angle < -STEER_LIMIT {
        -STEER_LIMIT
    } else {
        angle
    }
}

/// Servo compare value for a steering angle: positive steers right.
#[inline(always)]
pub const fn servo_position(angle: i16) -> u16 {
    (SERVO_CENTER as i16 + clamp_steer(angle) * SERVO_STEP) as u16
}

/// Left and right wheel speed command in percent, negative drives backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedCommand {
    pub left: i8,
    pub right: i8,
}

impl SpeedCommand {
    pub const STOP: Self = Self { left: 0, right: 0 };

    /// Builds a command, clamping both wheels to ±[`SPEED_LIMIT`].
    pub const fn new(left: i8, right: i8) -> Self {
        Self {
            left: clamp_speed(left),
            right: clamp_speed(right),
        }
    }
}

const fn clamp_speed(speed: i8) -> i8 {
    if speed > SPEED_LIMIT {
        SPEED_LIMIT
    } else if speed < -SPEED_LIMIT {
        -SPEED_LIMIT
    } else {
        speed
    }
}

/// Wheel rotation direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Reverse,
}

/// Set point for one motor bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelDrive {
    pub direction: Direction,
    /// Duty in percent of full scale (0..=100)
    pub duty: u8,
}

impl WheelDrive {
    /// Applies the slip ratio to a wheel command; the result saturates at full duty.
    fn scaled(speed: i8, ratio_pct: i16) -> Self {
        // Truncates towards zero like the float-to-int conversion of the speed product
        let scaled = speed as i32 * ratio_pct as i32 / 100;
        let direction = if scaled >= 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        Self {
            direction,
            duty: scaled.unsigned_abs().min(SPEED_LIMIT as u32) as u8,
        }
    }

    /// Duty as compare value of a timer with the given top.
    #[inline(always)]
    pub fn compare(&self, top: u32) -> u32 {
        self.duty as u32 * top / SPEED_LIMIT as u32
    }
}

/// Set points for both motor bridges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorDrive {
    pub left: WheelDrive,
    pub right: WheelDrive,
}

impl MotorDrive {
    /// Scales a speed command by the slip ratio (percent) and splits it per wheel.
    pub fn new(command: SpeedCommand, ratio_pct: i16) -> Self {
        Self {
            left: WheelDrive::scaled(command.left, ratio_pct),
            right: WheelDrive::scaled(command.right, ratio_pct),
        }
    }
}

/// Slip compensation: adapts the speed ratio from pulses counted per window.
///
/// With a negative pulse target the estimator is disabled and the ratio stays at its base.
pub struct RatioEstimator {
    base_pct: i16,
    ratio_pct: i16,
    target: i16,
}

impl RatioEstimator {
    /// Window length in timer ticks.
    pub const WINDOW_TICKS: u32 = 20;

    pub const fn new(base_pct: i16, target: i16) -> Self {
        Self {
            base_pct,
            ratio_pct: base_pct,
            target,
        }
    }

    /// Changes the pulse target per window, negative disables adaptation.
    pub fn set_target(&mut self, target: i16) {
        self.target = target;
    }

    pub fn set_base(&mut self, base_pct: i16) {
        self.base_pct = base_pct;
        self.ratio_pct = base_pct;
    }

    #[inline(always)]
    pub fn ratio(&self) -> i16 {
        self.ratio_pct
    }

    /// Closes the estimation window when it is due and returns the ratio to apply.
    pub fn update(&mut self, events: &EventCounters) -> i16 {
        if self.target < 0 {
            if events.window_ticks() >= Self::WINDOW_TICKS {
                events.take_window_pulses();
            }
            self.ratio_pct = self.base_pct;
            return self.ratio_pct;
        }

        if events.window_ticks() >= Self::WINDOW_TICKS {
            let pulses = events.take_window_pulses().min(i16::MAX as u32) as i16;
            let ratio = self.estimate(pulses);
            if ratio != self.ratio_pct {
                log_trace!("RATIO: {} pulses per window, ratio {}%", pulses, ratio);
            }
            self.ratio_pct = ratio;
        }
        self.ratio_pct
    }

    fn estimate(&self, pulses: i16) -> i16 {
        let target = self.target;
        let offset = if pulses < target / 2 {
            30
        } else if pulses < target {
            10
        } else if pulses > target {
            -35
        } else if pulses > target / 2 {
            -25
        } else {
            0
        };
        // A negative ratio would reverse the commanded direction
        (self.base_pct + offset).max(0)
    }
}
