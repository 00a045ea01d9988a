// Reflectance sensor array: calibration learning and binary classification.
//
// Key Features:
// - Packs eight calibrated sensor decisions into a single byte mask
// - Learns per-sensor thresholds from running min/max observations
// - Persists calibration through a backend-agnostic store interface

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

pub mod calibration;
pub mod classifier;

pub use calibration::{Calibration, CalibrationStore, Calibrator, StoreError};
pub use classifier::classify;

/// Number of reflectance sensors on the bar.
pub const SENSOR_COUNT: usize = 8;

/// One raw reading per sensor, index 0 is the rightmost sensor.
pub type RawReadings = [u16; SENSOR_COUNT];

/// Calibrated sensor bar state: bit i set means sensor i is over the dark line.
///
/// Bit 7 is the leftmost sensor, bit 0 the rightmost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorMask(pub u8);

impl SensorMask {
    /// Every sensor sees the light background.
    pub const CLEAR: Self = Self(0x00);
    /// Every sensor sees the dark line.
    pub const FULL: Self = Self(0xFF);

    #[inline(always)]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Masked equality: `(bits & mask) == pattern`.
    #[inline(always)]
    pub const fn matches(self, mask: u8, pattern: u8) -> bool {
        self.0 & mask == pattern
    }

    /// True when any of the bits in `mask` is set.
    #[inline(always)]
    pub const fn any(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    #[inline(always)]
    pub const fn is_clear(self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn is_set(self, sensor: usize) -> bool {
        sensor < SENSOR_COUNT && self.0 & (1 << sensor) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_equality_ignores_bits_outside_mask() {
        let mask = SensorMask(0b1001_1001);
        assert!(mask.matches(0b0111_1110, 0b0001_1000));
        assert!(!mask.matches(0b1111_1111, 0b0001_1000));
    }

    #[test]
    fn any_and_is_set_address_single_sensors() {
        let mask = SensorMask(0b1000_0001);
        assert!(mask.any(0b1000_0000));
        assert!(!mask.any(0b0111_1110));
        assert!(mask.is_set(0));
        assert!(mask.is_set(7));
        assert!(!mask.is_set(3));
        assert!(!mask.is_set(8));
    }
}
