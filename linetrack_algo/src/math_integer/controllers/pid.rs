// Implements a discrete fixed-point PID controller for velocity regulation loops.
//
// Key Features:
// - Integer only math, suitable for MCUs without FPU
// - Overflow limits precomputed from the gains at construction
// - Saturating proportional term, clamped integral sum and saturated output
// - Derivative on process value to avoid kicks on setpoint changes

// Detailed Operation:
// Gains are given pre-multiplied by SCALING_FACTOR. At construction the controller
// derives the largest error the proportional multiply can take (max_error) and the
// largest error sum the integral multiply can take (max_sum_error). Every tick the
// terms are limited against these bounds instead of being allowed to wrap, and the
// scaled sum is clamped to the i16 range, so downstream actuation always receives a
// bounded value. One instance per loop, e.g. one per wheel.

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// A Proportional-Integral-Derivative (PID) controller implementation
/// to calculate corrective action for controlling dynamic systems.
///
/// **Note**
/// - Based on integer implementation and works with i16 range
/// - Works with constant dt only
/// - Has integral anti-windup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PID {
    /// Proportional gain, multiplied with SCALING_FACTOR
    kp: i32,
    /// Integral gain, multiplied with SCALING_FACTOR
    ki: i32,
    /// Derivative gain, multiplied with SCALING_FACTOR
    kd: i32,

    /// Largest |error| whose proportional product stays inside i16
    max_error: i32,
    /// Largest |sum of errors| whose integral product stays inside MAX_I_TERM
    max_sum_error: i32,

    /// Accumulated error for the integral term
    sum_error: i32,
    /// Process value of the previous tick, for the derivative term
    last_process_value: i32,
    /// The PID controller output
    output: i16,
}

impl PID {
    /// Fixed-point scale of the gains.
    pub const SCALING_FACTOR: i32 = 128;
    /// Bound of the proportional term and of the output.
    pub const MAX_INT: i32 = i16::MAX as i32;
    /// Bound of the integral term.
    pub const MAX_I_TERM: i32 = i32::MAX / 2;

    /// Constructor for the PID controller
    ///
    /// # Arguments
    /// * `kp` - Proportional gain coefficient (scaled by SCALING_FACTOR)
    /// * `ki` - Integral gain coefficient (scaled by SCALING_FACTOR)
    /// * `kd` - Derivative gain coefficient (scaled by SCALING_FACTOR)
    ///
    /// # Returns
    /// A new instance with cleared history and overflow limits derived from the gains.
    pub fn new(kp: i16, ki: i16, kd: i16) -> Self {
        // Negative gains are not supported, they would also break the limit divisions
        let kp = Self::fit_coef(kp);
        let ki = Self::fit_coef(ki);
        let kd = Self::fit_coef(kd);

        Self {
            kp,
            ki,
            kd,
            max_error: Self::MAX_INT / (kp + 1),
            max_sum_error: Self::MAX_I_TERM / (ki + 1),
            sum_error: 0,
            last_process_value: 0,
            output: 0,
        }
    }

    /// Update the PID controller calculations, call once per control period
    ///
    /// # Arguments
    /// * `setpoint` - Desired value
    /// * `process_value` - Measured value
    ///
    /// # Returns
    /// The new output, always within ±MAX_INT.
    pub fn tick(&mut self, setpoint: i16, process_value: i16) -> i16 {
        // Widen inputs so the error itself can not wrap
        let process_value = process_value as i32;
        let error = setpoint as i32 - process_value;

        // ######################## PROPORTIONAL TERM #################################
        let p = if error > self.max_error {
            Self::MAX_INT
        } else if error < -self.max_error {
            -Self::MAX_INT
        } else {
            self.kp * error // |kp * error| < MAX_INT by construction of max_error
        };

        // ########################## INTEGRAL TERM ###################################
        let temp = self.sum_error + error;
        let i = if temp > self.max_sum_error {
            self.sum_error = self.max_sum_error;
            Self::MAX_I_TERM
        } else if temp < -self.max_sum_error {
            self.sum_error = -self.max_sum_error;
            -Self::MAX_I_TERM
        } else {
            self.sum_error = temp;
            self.ki * self.sum_error // |ki * sum| < MAX_I_TERM by construction of max_sum_error
        };

        // ######################### DERIVATIVE TERM ##################################
        let d = self
            .kd
            .saturating_mul(self.last_process_value - process_value);

        self.last_process_value = process_value;

        // ############################## OUTPUT ######################################
        let output = p.saturating_add(i).saturating_add(d) / Self::SCALING_FACTOR;
        self.output = Self::clamp(output, Self::MAX_INT) as i16;
        self.output
    }

    /// Clears the accumulated error, gains and derivative history are kept.
    pub fn reset_integrator(&mut self) {
        self.sum_error = 0;
    }

    /// Retrieve the output value of the last tick
    pub fn output(&self) -> i16 {
        self.output
    }

    pub fn sum_error(&self) -> i32 {
        self.sum_error
    }

    pub fn max_error(&self) -> i32 {
        self.max_error
    }

    pub fn max_sum_error(&self) -> i32 {
        self.max_sum_error
    }

    /// Fit the gain coefficient within the supported range (0..=i16::MAX)
    #[inline(always)]
    fn fit_coef(coef: i16) -> i32 {
        Self::clamp(coef as i32, Self::MAX_INT).max(0)
    }

    /// Clamp a value within a specified limit
    ///
    /// # Arguments
    /// * `value` - The value to clamp
    /// * `limit` - The maximum allowed positive or negative value
    ///
    /// # Returns
    /// The clamped value, ensuring it stays within ±`limit`.
    #[inline]
    fn clamp(value: i32, limit: i32) -> i32 {
        if value > limit {
            limit
        } else if value < -limit {
            -limit
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_derived_from_gains() {
        let pid = PID::new(10, 0, 0);
        assert_eq!(pid.max_error(), i16::MAX as i32 / 11);
        assert_eq!(pid.max_sum_error(), PID::MAX_I_TERM);

        let pid = PID::new(0, 1000, 0);
        assert_eq!(pid.max_error(), i16::MAX as i32);
        assert_eq!(pid.max_sum_error(), PID::MAX_I_TERM / 1001);
    }

    #[test]
    fn proportional_saturates_just_past_max_error() {
        let mut pid = PID::new(10, 0, 0);
        let max_error = pid.max_error() as i16;

        // error = -(max_error + 1): P saturates at -MAX_INT, then the scaling applies
        let out = pid.tick(0, max_error + 1);
        assert_eq!(out as i32, -PID::MAX_INT / PID::SCALING_FACTOR);
        assert_eq!(out, -255);

        let mut pid = PID::new(10, 0, 0);
        let out = pid.tick(max_error + 1, 0);
        assert_eq!(out as i32, PID::MAX_INT / PID::SCALING_FACTOR);
    }

    #[test]
    fn proportional_is_linear_inside_max_error() {
        let mut pid = PID::new(10, 0, 0);
        let max_error = pid.max_error() as i16;
        assert_eq!(pid.tick(max_error, 0) as i32, 10 * max_error as i32 / 128);
        let mut pid = PID::new(128, 0, 0);
        assert_eq!(pid.tick(100, 40), 60);
    }

    #[test]
    fn integral_sum_winds_up_to_bound_and_holds() {
        let mut pid = PID::new(0, 1000, 0);
        let bound = pid.max_sum_error();

        let mut reached = None;
        for step in 0..100 {
            pid.tick(30000, 0);
            assert!(pid.sum_error() <= bound);
            if reached.is_none() && pid.sum_error() == bound {
                reached = Some(step);
            }
        }
        assert!(reached.is_some());
        assert_eq!(pid.sum_error(), bound);

        pid.tick(30000, 0);
        assert_eq!(pid.sum_error(), bound);
    }

    #[test]
    fn negative_windup_is_symmetric() {
        let mut pid = PID::new(0, 1000, 0);
        for _ in 0..100 {
            pid.tick(-30000, 0);
        }
        assert_eq!(pid.sum_error(), -pid.max_sum_error());
    }

    #[test]
    fn reset_integrator_only_clears_the_sum() {
        let mut pid = PID::new(64, 32, 16);
        pid.tick(500, 100);
        pid.tick(500, 200);
        assert_ne!(pid.sum_error(), 0);
        let max_error = pid.max_error();
        pid.reset_integrator();
        assert_eq!(pid.sum_error(), 0);
        assert_eq!(pid.max_error(), max_error);

        // Derivative history survives: same process value gives no D contribution
        let mut fresh = PID::new(64, 32, 16);
        fresh.tick(0, 200);
        fresh.reset_integrator();
        assert_eq!(pid.tick(0, 200), fresh.tick(0, 200));
    }

    #[test]
    fn derivative_acts_on_process_value() {
        let mut pid = PID::new(0, 0, 128);
        assert_eq!(pid.tick(0, 0), 0);
        // process value jumps up by 50, derivative pushes back by 50
        assert_eq!(pid.tick(0, 50), -50);
    }

    #[test]
    fn output_stays_bounded_for_extreme_inputs() {
        let gains = [
            (0, 0, 0),
            (1, 1, 1),
            (128, 128, 128),
            (i16::MAX, i16::MAX, i16::MAX),
            (-5, -5, -5),
        ];
        let values = [i16::MIN, -12345, -1, 0, 1, 12345, i16::MAX];
        for &(p, i, d) in gains.iter() {
            let mut pid = PID::new(p, i, d);
            for &setpoint in values.iter() {
                for &process in values.iter() {
                    let out = pid.tick(setpoint, process) as i32;
                    assert!(out >= -PID::MAX_INT && out <= PID::MAX_INT);
                }
            }
        }
    }

    #[test]
    fn negative_gains_are_fitted_to_zero() {
        let pid = PID::new(-1, -1, -1);
        assert_eq!(pid, PID::new(0, 0, 0));
    }
}
