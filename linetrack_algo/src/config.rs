// Runtime tuning of the line tracking controller.
//
// Key Features:
// - Steering bias added to every tracking correction
// - Slip compensation ratio base, as selected on the mode switch
// - Braking and settling windows derived from the ratio with integer math only

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Fixed-point scale for tick windows: 1 tick = 100_000 units.
pub const WINDOW_SCALE: i64 = 100_000;

/// Controller tuning. Owned by [`crate::LineController`], read every cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Extra steering added on top of every tracking correction (servo units).
    pub steer_bias: i16,
    /// Base slip compensation ratio in percent of the commanded speed.
    pub ratio_base_pct: i16,
    /// Encoder pulses expected per estimator window, negative disables the estimator.
    pub target_window_pulses: i16,
}

impl Config {
    /// Ratio base with the mode switch at zero.
    pub const RATIO_BASE_DEFAULT: i16 = 10;

    pub const fn new() -> Self {
        Self {
            steer_bias: 10,
            ratio_base_pct: Self::RATIO_BASE_DEFAULT,
            target_window_pulses: -1,
        }
    }

    /// Configuration for a 4 bit mode switch value: every step adds 10% to the ratio base.
    pub const fn from_switch(switch: u8) -> Self {
        let mut config = Self::new();
        config.ratio_base_pct = Self::RATIO_BASE_DEFAULT + 10 * (switch & 0x0F) as i16;
        config
    }

    /// Configuration for the contacts of the mode switch, contact 0 is the lowest bit.
    pub const fn from_switch_contacts(closed: [bool; 4]) -> Self {
        let mut switch: u8 = 0;
        let mut bit: usize = 0;
        while bit < closed.len() {
            if closed[bit] {
                switch |= 1 << bit;
            }
            bit += 1;
        }
        Self::from_switch(switch)
    }

    /// Enables the slip ratio estimator with the given pulse target per window.
    pub const fn with_target_pulses(mut self, pulses: i16) -> Self {
        self.target_window_pulses = pulses;
        self
    }

    /// Reaction delay factor scaled by [`WINDOW_SCALE`]: `1.4 - 1.125 * ratio`.
    ///
    /// Negative for ratios above ~124%, which is kept as is: windows then grow or collapse
    /// exactly like the floating point formula would.
    pub const fn delay_scaled(&self) -> i64 {
        140_000 - 1125 * self.ratio_base_pct as i64
    }

    /// Braking window as ticks scaled by [`WINDOW_SCALE`]: `285 - 200 * delay`.
    pub const fn brake_window_scaled(&self) -> i64 {
        285 * WINDOW_SCALE - 200 * self.delay_scaled()
    }

    /// Lane change settling window as ticks scaled by [`WINDOW_SCALE`]: `200 * delay`.
    pub const fn settle_window_scaled(&self) -> i64 {
        200 * self.delay_scaled()
    }

    /// Whole ticks of the braking window, for diagnostics.
    pub const fn brake_window(&self) -> i64 {
        self.brake_window_scaled() / WINDOW_SCALE
    }

    /// Whole ticks of the settling window, for diagnostics.
    pub const fn settle_window(&self) -> i64 {
        self.settle_window_scaled() / WINDOW_SCALE
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
