use hal::{
    clocks::Clocks,
    gpio::Pin,
    pac::{TIM2, TIM3},
    timer::{
        Alignment, CaptureCompareDma, CountDir, OutputCompare, TimChannel, Timer, TimerConfig,
        UpdateReqSrc,
    },
};

use linetrack_algo::drive::{Direction, MotorDrive, SERVO_PERIOD};

use super::pinout;

/// Rear motor bridges: PWM on TIM2 channels 3/4 plus one direction pin per side.
pub struct MotorPwm {
    tim: Timer<TIM2>,
    left_dir: Pin,
    right_dir: Pin,
}

impl MotorPwm {
    pub fn new(tim2: TIM2, clock_cfg: &Clocks, freq: u16) -> Self {
        // Edge aligned, the bridges only need duty and direction
        let timer = Timer::new_tim2(
            tim2,
            freq as f32,
            TimerConfig {
                one_pulse_mode: false,
                update_request_source: UpdateReqSrc::Any,
                auto_reload_preload: true,
                alignment: Alignment::Edge,
                capture_compare_dma: CaptureCompareDma::Update,
                direction: CountDir::Up,
            },
            clock_cfg,
        );

        MotorPwm {
            tim: timer,
            left_dir: pinout::drive::LEFT_DIR.init(),
            right_dir: pinout::drive::RIGHT_DIR.init(),
        }
    }

    pub fn begin(&mut self) {
        // Both bridges start stopped
        self.tim
            .enable_pwm_output(TimChannel::C3, OutputCompare::Pwm1, 0.0);
        self.tim
            .enable_pwm_output(TimChannel::C4, OutputCompare::Pwm1, 0.0);
        self.tim.enable();

        pinout::drive::LEFT_PWM.init();
        pinout::drive::RIGHT_PWM.init();
        self.left_dir.set_low();
        self.right_dir.set_low();
    }

    pub fn apply(&mut self, drive: &MotorDrive) {
        let top = self.tim.get_max_duty();
        Self::set_direction(&mut self.left_dir, drive.left.direction);
        Self::set_direction(&mut self.right_dir, drive.right.direction);
        self.tim
            .set_duty(TimChannel::C3, drive.left.compare(top));
        self.tim
            .set_duty(TimChannel::C4, drive.right.compare(top));
    }

    pub fn stop(&mut self) {
        self.tim.set_duty(TimChannel::C3, 0);
        self.tim.set_duty(TimChannel::C4, 0);
    }

    fn set_direction(pin: &mut Pin, direction: Direction) {
        match direction {
            Direction::Forward => pin.set_low(),
            Direction::Reverse => pin.set_high(),
        }
    }
}

/// Steering servo on TIM3 channel 1.
pub struct ServoPwm {
    tim: Timer<TIM3>,
}

impl ServoPwm {
    /// Servo frame rate.
    pub const FREQ: f32 = 100.;

    pub fn new(tim3: TIM3, clock_cfg: &Clocks) -> Self {
        let timer = Timer::new_tim3(tim3, Self::FREQ, Default::default(), clock_cfg);
        ServoPwm { tim: timer }
    }

    pub fn begin(&mut self, position: u16) {
        self.tim
            .enable_pwm_output(TimChannel::C1, OutputCompare::Pwm1, 0.0);
        self.tim.enable();
        pinout::drive::SERVO.init();
        self.set_position(position);
    }

    /// Moves the servo to a compare position given on the [`SERVO_PERIOD`] scale.
    pub fn set_position(&mut self, position: u16) {
        let top: u32 = self.tim.get_max_duty().into();
        let duty = position.min(SERVO_PERIOD) as u32 * top / SERVO_PERIOD as u32;
        // duty <= top, so it fits the timer's compare width
        self.tim
            .set_duty(TimChannel::C1, (duty as u16).into());
    }
}
