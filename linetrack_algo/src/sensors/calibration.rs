// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::fmt;

use super::{RawReadings, SENSOR_COUNT};

/// Exclusive upper bound of the 10 bit sensor readings.
pub const ADC_FULL_SCALE: u16 = 1024;

/// Backend holding one (min, max) pair per sensor across power cycles.
///
/// The backend decides the layout. `commit` is called once after all pairs are written,
/// so page based memories can erase and program in one go.
pub trait CalibrationStore {
    type Error;

    fn read_pair(&mut self, sensor: usize) -> Result<(u16, u16), Self::Error>;

    fn write_pair(&mut self, sensor: usize, min: u16, max: u16) -> Result<(), Self::Error>;

    fn commit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Failure while loading or saving a [`Calibration`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError<E> {
    /// The storage backend reported an error.
    Backend(E),
    /// A stored pair has its minimum above its maximum.
    Inconsistent { sensor: usize },
    /// Every stored word is erased, the car was never calibrated.
    Erased,
}

impl<E: fmt::Display> fmt::Display for StoreError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(err) => write!(f, "calibration store backend error: {}", err),
            StoreError::Inconsistent { sensor } => {
                write!(f, "stored calibration of sensor {} has min above max", sensor)
            }
            StoreError::Erased => write!(f, "no calibration stored"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug + fmt::Display> std::error::Error for StoreError<E> {}

/// Learned per-sensor light/dark observations and the derived thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Lowest reading seen during learning (sensor over the line)
    min: [u16; SENSOR_COUNT],
    /// Highest reading seen during learning (sensor over the background)
    max: [u16; SENSOR_COUNT],
    /// Midpoint between min and max, a reading below it counts as dark
    threshold: [u16; SENSOR_COUNT],
}

impl Calibration {
    /// Power-on calibration: every threshold is 0, so nothing ever reads as dark.
    pub const fn new() -> Self {
        Self {
            min: [0; SENSOR_COUNT],
            max: [0; SENSOR_COUNT],
            threshold: [0; SENSOR_COUNT],
        }
    }

    /// Builds thresholds from learned pairs.
    ///
    /// A sensor whose minimum exceeds its maximum was never sampled and keeps threshold 0.
    pub fn from_pairs(min: [u16; SENSOR_COUNT], max: [u16; SENSOR_COUNT]) -> Self {
        let mut threshold = [0; SENSOR_COUNT];
        for (sensor, slot) in threshold.iter_mut().enumerate() {
            if min[sensor] <= max[sensor] {
                *slot = midpoint(min[sensor], max[sensor]);
            }
        }
        Self {
            min,
            max,
            threshold,
        }
    }

    /// Threshold of one sensor, `None` past the end of the bar.
    #[inline(always)]
    pub fn threshold(&self, sensor: usize) -> Option<u16> {
        self.threshold.get(sensor).copied()
    }

    #[inline(always)]
    pub fn thresholds(&self) -> &[u16; SENSOR_COUNT] {
        &self.threshold
    }

    pub fn pair(&self, sensor: usize) -> Option<(u16, u16)> {
        Some((*self.min.get(sensor)?, *self.max.get(sensor)?))
    }

    /// True when the classifier can only produce a fixed mask: every threshold unset
    /// (always light) or beyond the sensor range (erased store, always dark).
    pub fn is_degenerate(&self) -> bool {
        self.threshold.iter().all(|&t| t == 0)
            || self.threshold.iter().all(|&t| t >= ADC_FULL_SCALE)
    }

    /// Reads all pairs back from the store.
    ///
    /// A store whose words are all erased gives [`StoreError::Erased`], callers then run on
    /// the power-on calibration instead of thresholds above the sensor range.
    pub fn load<S: CalibrationStore>(store: &mut S) -> Result<Self, StoreError<S::Error>> {
        let mut min = [0; SENSOR_COUNT];
        let mut max = [0; SENSOR_COUNT];
        let mut erased = true;
        for sensor in 0..SENSOR_COUNT {
            let (lo, hi) = store.read_pair(sensor).map_err(StoreError::Backend)?;
            if lo > hi {
                return Err(StoreError::Inconsistent { sensor });
            }
            erased &= lo == u16::MAX && hi == u16::MAX;
            min[sensor] = lo;
            max[sensor] = hi;
        }
        if erased {
            return Err(StoreError::Erased);
        }

        let calibration = Self::from_pairs(min, max);
        if calibration.is_degenerate() {
            log_warn!("CALIBRATION: Stored thresholds are degenerate, sensors give a fixed mask");
        }
        Ok(calibration)
    }

    /// Writes all pairs and commits the store.
    pub fn save<S: CalibrationStore>(&self, store: &mut S) -> Result<(), StoreError<S::Error>> {
        for sensor in 0..SENSOR_COUNT {
            store
                .write_pair(sensor, self.min[sensor], self.max[sensor])
                .map_err(StoreError::Backend)?;
        }
        store.commit().map_err(StoreError::Backend)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

/// Learning session collecting running min/max per sensor.
///
/// Runs until the caller decides to stop, then [`Calibrator::finish`] derives the thresholds.
pub struct Calibrator {
    min: [u16; SENSOR_COUNT],
    max: [u16; SENSOR_COUNT],
    samples: u32,
}

impl Calibrator {
    pub const fn new() -> Self {
        Self {
            min: [ADC_FULL_SCALE; SENSOR_COUNT],
            max: [0; SENSOR_COUNT],
            samples: 0,
        }
    }

    /// Folds one sweep of raw readings into the running extremes.
    pub fn sample(&mut self, raw: &RawReadings) {
        for (sensor, &value) in raw.iter().enumerate() {
            self.min[sensor] = self.min[sensor].min(value);
            self.max[sensor] = self.max[sensor].max(value);
        }
        self.samples = self.samples.saturating_add(1);
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Ends the session and derives thresholds as the midpoint of min and max.
    pub fn finish(self) -> Calibration {
        let calibration = Calibration::from_pairs(self.min, self.max);
        for (sensor, (&min, &max)) in self.min.iter().zip(self.max.iter()).enumerate() {
            if min > max {
                log_warn!("CALIBRATION: Sensor {} was never sampled", sensor);
            } else {
                log_info!(
                    "CALIBRATION: Sensor {}: min {}, max {}, threshold {}",
                    sensor,
                    min,
                    max,
                    calibration.threshold[sensor]
                );
            }
        }
        log_info!("CALIBRATION: Finished after {} samples", self.samples);
        calibration
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
fn midpoint(min: u16, max: u16) -> u16 {
    ((min as u32 + max as u32) / 2) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::classify;

    /// Word array with all minima first and all maxima after.
    struct MemoryStore {
        words: [u16; 2 * SENSOR_COUNT],
        commits: usize,
        fail: bool,
    }

    impl MemoryStore {
        fn erased() -> Self {
            Self {
                words: [u16::MAX; 2 * SENSOR_COUNT],
                commits: 0,
                fail: false,
            }
        }
    }

    impl CalibrationStore for MemoryStore {
        type Error = &'static str;

        fn read_pair(&mut self, sensor: usize) -> Result<(u16, u16), Self::Error> {
            if self.fail {
                return Err("bus");
            }
            Ok((self.words[sensor], self.words[sensor + SENSOR_COUNT]))
        }

        fn write_pair(&mut self, sensor: usize, min: u16, max: u16) -> Result<(), Self::Error> {
            if self.fail {
                return Err("bus");
            }
            self.words[sensor] = min;
            self.words[sensor + SENSOR_COUNT] = max;
            Ok(())
        }

        fn commit(&mut self) -> Result<(), Self::Error> {
            self.commits += 1;
            Ok(())
        }
    }

    #[test]
    fn learning_tracks_extremes_and_averages() {
        let mut calibrator = Calibrator::new();
        calibrator.sample(&[100, 200, 300, 400, 500, 600, 700, 800]);
        calibrator.sample(&[300, 220, 100, 400, 900, 20, 700, 1000]);
        assert_eq!(calibrator.samples(), 2);

        let calibration = calibrator.finish();
        assert_eq!(calibration.pair(0), Some((100, 300)));
        assert_eq!(calibration.threshold(0), Some(200));
        assert_eq!(calibration.threshold(3), Some(400));
        assert_eq!(calibration.threshold(5), Some(310));
        assert_eq!(calibration.threshold(7), Some(900));
        assert!(!calibration.is_degenerate());
    }

    #[test]
    fn unsampled_session_is_degenerate() {
        let calibration = Calibrator::new().finish();
        assert!(calibration.is_degenerate());
        assert_eq!(calibration.thresholds(), &[0; SENSOR_COUNT]);
    }

    #[test]
    fn power_on_default_is_degenerate() {
        assert!(Calibration::default().is_degenerate());
    }

    #[test]
    fn save_then_load_keeps_pairs_and_commits_once() {
        let mut store = MemoryStore::erased();
        let mut calibrator = Calibrator::new();
        calibrator.sample(&[100, 120, 140, 160, 180, 200, 220, 240]);
        calibrator.sample(&[900, 880, 860, 840, 820, 800, 780, 760]);
        let calibration = calibrator.finish();

        calibration.save(&mut store).unwrap();
        assert_eq!(store.commits, 1);
        assert_eq!(store.words[0], 100);
        assert_eq!(store.words[SENSOR_COUNT], 900);

        let loaded = Calibration::load(&mut store).unwrap();
        assert_eq!(loaded, calibration);
    }

    #[test]
    fn sensors_past_the_bar_have_no_calibration() {
        let calibration = Calibration::from_pairs([100; SENSOR_COUNT], [300; SENSOR_COUNT]);
        assert_eq!(calibration.threshold(SENSOR_COUNT - 1), Some(200));
        assert_eq!(calibration.threshold(SENSOR_COUNT), None);
        assert_eq!(calibration.pair(SENSOR_COUNT), None);
    }

    #[test]
    fn erased_store_means_never_calibrated() {
        let mut store = MemoryStore::erased();
        assert_eq!(Calibration::load(&mut store), Err(StoreError::Erased));

        // Fallback used at power up: the floor reads all light
        let calibration = Calibration::load(&mut store).unwrap_or_default();
        assert_eq!(calibration, Calibration::new());
        assert!(classify(&[900; SENSOR_COUNT], &calibration).is_clear());
    }

    #[test]
    fn partly_erased_store_still_loads() {
        let mut store = MemoryStore::erased();
        store.words[0] = 100;
        store.words[SENSOR_COUNT] = 300;
        let loaded = Calibration::load(&mut store).unwrap();
        assert_eq!(loaded.threshold(0), Some(200));
        assert_eq!(loaded.threshold(1), Some(u16::MAX));
    }

    #[test]
    fn inverted_pair_is_rejected() {
        let mut store = MemoryStore::erased();
        store.words[2] = 700;
        store.words[2 + SENSOR_COUNT] = 300;
        assert_eq!(
            Calibration::load(&mut store),
            Err(StoreError::Inconsistent { sensor: 2 })
        );
    }

    #[test]
    fn backend_errors_are_propagated() {
        let mut store = MemoryStore::erased();
        store.fail = true;
        assert_eq!(
            Calibration::load(&mut store),
            Err(StoreError::Backend("bus"))
        );
        assert_eq!(
            Calibration::new().save(&mut store),
            Err(StoreError::Backend("bus"))
        );
    }
}
