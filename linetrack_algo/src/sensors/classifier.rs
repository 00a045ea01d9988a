// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use super::{Calibration, RawReadings, SensorMask};

/// Converts raw readings into a sensor mask: bit i is set when `raw[i]` is below the
/// learned threshold of sensor i.
///
/// Constant time, no side effects. With a degenerate calibration the result is a fixed
/// mask (all light for unset thresholds, all dark for an erased store).
#[inline]
pub fn classify(raw: &RawReadings, calibration: &Calibration) -> SensorMask {
    let mut bits: u8 = 0;
    for (sensor, (&value, &threshold)) in raw.iter().zip(calibration.thresholds()).enumerate() {
        if value < threshold {
            bits |= 1 << sensor;
        }
    }
    SensorMask(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Calibrator, SENSOR_COUNT};

    fn calibration() -> Calibration {
        Calibration::from_pairs([100; SENSOR_COUNT], [300; SENSOR_COUNT])
    }

    #[test]
    fn reading_below_midpoint_is_dark() {
        let calibration = calibration();
        let mut raw = [250; SENSOR_COUNT];

        raw[0] = 199;
        assert_eq!(classify(&raw, &calibration), SensorMask(0b0000_0001));

        raw[0] = 201;
        assert_eq!(classify(&raw, &calibration), SensorMask(0b0000_0000));

        raw[0] = 200;
        assert_eq!(classify(&raw, &calibration), SensorMask(0b0000_0000));
    }

    #[test]
    fn crossing_one_threshold_flips_only_that_bit() {
        let calibration = calibration();
        let base = [150, 250, 150, 250, 150, 250, 150, 250];
        let base_mask = classify(&base, &calibration);
        assert_eq!(base_mask, SensorMask(0b0101_0101));

        for sensor in 0..SENSOR_COUNT {
            let mut raw = base;
            raw[sensor] = if base[sensor] < 200 { 250 } else { 150 };
            let flipped = classify(&raw, &calibration);
            assert_eq!(flipped.bits() ^ base_mask.bits(), 1 << sensor);
        }
    }

    #[test]
    fn per_sensor_thresholds_are_independent() {
        let mut calibrator = Calibrator::new();
        calibrator.sample(&[0, 100, 200, 300, 400, 500, 600, 700]);
        calibrator.sample(&[200, 300, 400, 500, 600, 700, 800, 900]);
        let calibration = calibrator.finish();

        let raw = [99, 201, 299, 401, 499, 601, 699, 801];
        assert_eq!(classify(&raw, &calibration), SensorMask(0b0101_0101));
    }

    #[test]
    fn unset_calibration_reads_all_light() {
        let raw = [0; SENSOR_COUNT];
        assert_eq!(classify(&raw, &Calibration::new()), SensorMask::CLEAR);
    }

    #[test]
    fn erased_calibration_reads_all_dark() {
        let calibration = Calibration::from_pairs([u16::MAX; SENSOR_COUNT], [u16::MAX; SENSOR_COUNT]);
        let raw = [1023; SENSOR_COUNT];
        assert_eq!(classify(&raw, &calibration), SensorMask::FULL);
    }
}
