#![no_std]

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod logging;

pub mod config;
pub mod drive;
pub mod math_integer;
pub mod motion;
pub mod sensors;
pub mod timing;

use config::Config;
use drive::{servo_position, MotorDrive, RatioEstimator};
use motion::{ControlState, MotionStateMachine};
use sensors::{classify, Calibration, RawReadings, SensorMask};
use timing::EventCounters;

/// Actuator set points and diagnostics produced by one control cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outputs {
    pub state: ControlState,
    /// Diagnostic display code of `state`
    pub code: u8,
    pub sensors: SensorMask,
    /// Steering angle within the steering limit
    pub steer: i16,
    /// Servo compare value for `steer`
    pub servo: u16,
    pub drive: MotorDrive,
    /// Slip compensation ratio applied to `drive`, in percent
    pub ratio_pct: i16,
}

/// The line tracking controller: owns calibration, state machine and slip estimator,
/// and reads the event counters shared with the interrupt handlers.
pub struct LineController<'a> {
    events: &'a EventCounters, // Tick and encoder counters, written by interrupt handlers
    calibration: Calibration,  // Per-sensor thresholds, swapped only between sessions
    machine: MotionStateMachine,
    ratio: RatioEstimator,
    config: Config,
}

impl<'a> LineController<'a> {
    /// Create a controller tracking the line from [`ControlState::StraightLine`].
    ///
    /// # Arguments
    /// * `events` - Counters incremented by the tick and encoder interrupts
    /// * `calibration` - Sensor thresholds, usually loaded from the calibration store
    /// * `config` - Steering bias and slip ratio tuning
    pub fn new(events: &'a EventCounters, calibration: Calibration, config: Config) -> Self {
        if calibration.is_degenerate() {
            log_warn!("CONTROLLER: Running with degenerate calibration");
        }
        log_info!(
            "CONTROLLER: Ratio base {}%, brake window {} ticks, settle window {} ticks",
            config.ratio_base_pct,
            config.brake_window(),
            config.settle_window()
        );

        let mut machine = MotionStateMachine::new();
        events.reset(machine.enter(ControlState::StraightLine));

        Self {
            events,
            calibration,
            machine,
            ratio: RatioEstimator::new(config.ratio_base_pct, config.target_window_pulses),
            config,
        }
    }

    /// Runs one control cycle on a fresh sweep of raw sensor readings.
    pub fn tick(&mut self, raw: &RawReadings) -> Outputs {
        let sensors = classify(raw, &self.calibration);
        let counters = self.events.snapshot();

        let reset = self.machine.step(sensors, counters, &self.config);
        self.events.reset(reset);

        let ratio_pct = self.ratio.update(self.events);
        let state = self.machine.state();
        let steer = self.machine.steering();

        Outputs {
            state,
            code: state.code(),
            sensors,
            steer,
            servo: servo_position(steer),
            drive: MotorDrive::new(self.machine.speed(), ratio_pct),
            ratio_pct,
        }
    }

    /// Enters the state with the given diagnostic code; unknown codes start
    /// [`ControlState::StraightLine`].
    pub fn start_in(&mut self, code: u8) -> ControlState {
        let state = ControlState::from_code(code).unwrap_or_else(|| {
            log_warn!("CONTROLLER: Unknown state code {}, tracking the line", code);
            ControlState::StraightLine
        });
        self.events.reset(self.machine.enter(state));
        state
    }

    /// Replaces the sensor thresholds, only between calibration sessions.
    pub fn recalibrate(&mut self, calibration: Calibration) {
        if calibration.is_degenerate() {
            log_warn!("CONTROLLER: New calibration is degenerate");
        }
        self.calibration = calibration;
    }

    /// Replaces the tuning; the slip estimator restarts from the new base.
    pub fn reconfigure(&mut self, config: Config) {
        self.ratio.set_base(config.ratio_base_pct);
        self.ratio.set_target(config.target_window_pulses);
        self.config = config;
    }

    pub fn state(&self) -> ControlState {
        self.machine.state()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::Direction;
    use crate::sensors::SENSOR_COUNT;
    use crate::timing::Counters;

    // Reflectance readings: the dark line reflects little and reads low
    const OVER_LINE: u16 = 100;
    const BACKGROUND: u16 = 900;

    fn calibration() -> Calibration {
        Calibration::from_pairs([OVER_LINE; SENSOR_COUNT], [BACKGROUND; SENSOR_COUNT])
    }

    /// Raw sweep with the given sensors over the line; bit i is sensor i.
    fn sweep(bits: u8) -> RawReadings {
        let mut raw = [BACKGROUND; SENSOR_COUNT];
        for (sensor, value) in raw.iter_mut().enumerate() {
            if bits & (1 << sensor) != 0 {
                *value = OVER_LINE;
            }
        }
        raw
    }

    #[test]
    fn low_reading_is_over_the_line() {
        let mut raw = [BACKGROUND; SENSOR_COUNT];
        raw[3] = OVER_LINE;
        assert_eq!(classify(&raw, &calibration()), SensorMask(0b0000_1000));
        assert_eq!(classify(&sweep(0b0001_1000), &calibration()), SensorMask(0b0001_1000));
    }

    #[test]
    fn centred_line_drives_both_wheels() {
        let events = EventCounters::new();
        let mut controller = LineController::new(&events, calibration(), Config::new());
        let out = controller.tick(&sweep(0b0001_1000));
        assert_eq!(out.state, ControlState::StraightLine);
        assert_eq!(out.code, 10);
        assert_eq!(out.steer, 0);
        assert_eq!(out.servo, 3150);
        assert_eq!(out.ratio_pct, 10);
        assert_eq!(out.drive.left.duty, 10);
        assert_eq!(out.drive.right.duty, 10);
    }

    #[test]
    fn transition_restarts_dwell_counters() {
        let events = EventCounters::new();
        let mut controller = LineController::new(&events, calibration(), Config::new());
        for _ in 0..40 {
            events.on_tick();
            events.on_pulse();
        }
        let out = controller.tick(&sweep(0b1111_0000));
        assert_eq!(out.state, ControlState::LaneChangeLeft1);
        assert_eq!(events.snapshot(), Counters::new(0, 0));
    }

    #[test]
    fn start_in_falls_back_to_straight_line() {
        let events = EventCounters::new();
        let mut controller = LineController::new(&events, calibration(), Config::new());
        events.on_tick();
        assert_eq!(controller.start_in(71), ControlState::LineLostRecovery1);
        assert_eq!(events.snapshot(), Counters::new(0, 0));
        assert_eq!(controller.start_in(99), ControlState::StraightLine);
    }

    #[test]
    fn degenerate_calibration_keeps_running() {
        let events = EventCounters::new();
        let mut controller = LineController::new(&events, Calibration::new(), Config::new());
        let out = controller.tick(&sweep(0b0001_1000));
        assert_eq!(out.sensors, SensorMask::CLEAR);
        assert_eq!(out.state, ControlState::StraightLine);

        controller.recalibrate(calibration());
        let out = controller.tick(&sweep(0b0001_1000));
        assert_eq!(out.sensors, SensorMask(0b0001_1000));
    }

    #[test]
    fn never_calibrated_car_stands_still() {
        let events = EventCounters::new();
        let mut controller = LineController::new(&events, Calibration::new(), Config::new());
        for _ in 0..2000 {
            events.on_tick();
            let out = controller.tick(&[BACKGROUND; SENSOR_COUNT]);
            assert!(out.sensors.is_clear());
            assert_eq!(out.state, ControlState::StraightLine);
            assert_eq!(out.drive.left.duty, 0);
            assert_eq!(out.drive.right.duty, 0);
        }
    }

    #[test]
    fn reconfigure_changes_ratio_and_bias() {
        let events = EventCounters::new();
        let mut controller = LineController::new(&events, calibration(), Config::new());
        let mut config = Config::from_switch(9);
        config.steer_bias = 0;
        controller.reconfigure(config);

        let out = controller.tick(&sweep(0b0000_0010));
        assert_eq!(out.steer, 75);
        assert_eq!(out.ratio_pct, 100);
        assert_eq!(out.drive.left.duty, 100);
        assert_eq!(out.drive.right.duty, 40);
        assert_eq!(out.drive.right.direction, Direction::Forward);
    }
}
