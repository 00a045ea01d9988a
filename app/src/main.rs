#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use hal::{
    self,
    clocks::Clocks,
    dma,
    dma::{Dma, DmaChannel, DmaInterrupt, DmaPeriph},
    flash::Flash,
    gpio::Pull,
    pac,
    pac::{DMA1, TIM4},
    timer::{Timer, TimerInterrupt},
};

use linetrack_algo::{
    config::Config,
    drive::servo_position,
    motion::ControlState,
    sensors::{Calibration, Calibrator, RawReadings, StoreError, SENSOR_COUNT},
    timing::EventCounters,
    LineController,
};

use cortex_m;

/// Tick and encoder counters, written by the interrupt handlers, read by the control task.
static EVENTS: EventCounters = EventCounters::new();

static mut SENSOR_BUF: [u16; SENSOR_COUNT] = [0; SENSOR_COUNT];

/// Dwell tick rate, also the control rate: every tick samples the sensor bar once.
const TICK_FREQ: f32 = 1000.;
const MOTOR_PWM_FREQ: u16 = 20000;

pub enum Mode {
    /// Collecting sensor extremes; the press after the first release ends the session
    Learning { calibrator: Calibrator, armed: bool },
    Running,
}

#[rtic::app(device = pac, peripherals = true, dispatchers = [TIM7])]
mod app {
    use super::*;

    use linetrack_drivers::*;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        tick_timer: Timer<TIM4>,
        sensor_bar: sensor_bar::SensorBar,
        encoder: encoder::PulseInput,
        dma1: Dma<DMA1>,
        controller: LineController<'static>,
        store: flash_store::FlashStore,
        motors: pwm::MotorPwm,
        servo: pwm::ServoPwm,
        learn_button: hal::gpio::Pin,
        mode: Mode,
        last_state: ControlState,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let sysclk_freq = clock_cfg.sysclk(); // System clock frequency in Hz
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", sysclk_freq / 1000000);

        // Actuators first, so the car stands still with straight wheels
        let mut motors = pwm::MotorPwm::new(dp.TIM2, &clock_cfg, MOTOR_PWM_FREQ);
        motors.begin();
        let mut servo = pwm::ServoPwm::new(dp.TIM3, &clock_cfg);
        servo.begin(servo_position(0));

        let mut store = flash_store::FlashStore::new(Flash::new(dp.FLASH));
        let calibration = match Calibration::load(&mut store) {
            Ok(calibration) => calibration,
            Err(StoreError::Erased) => {
                defmt::warn!("CALIBRATION: Nothing stored, hold the learn button at reset to calibrate");
                Calibration::new()
            }
            Err(err) => {
                defmt::warn!("CALIBRATION: Stored calibration unusable: {}", err);
                Calibration::new()
            }
        };

        let mut learn_button = pinout::sensors::LEARN_BUTTON.init();
        learn_button.pull(Pull::Up);
        let mode = if learn_button.is_low() {
            defmt::info!("CALIBRATION: Learning, sweep the bar over line and floor, press to finish");
            motors.stop();
            Mode::Learning {
                calibrator: Calibrator::new(),
                armed: false,
            }
        } else {
            Mode::Running
        };

        let contacts = pinout::sensors::MODE_SWITCH.map(|def| {
            let mut contact = def.init();
            contact.pull(Pull::Up);
            contact
        });
        // Let the pull-ups charge the switch lines
        cortex_m::asm::delay(1_000);
        let closed: [bool; 4] = core::array::from_fn(|bit| contacts[bit].is_low());
        let config = Config::from_switch_contacts(closed);
        defmt::info!("CONFIG: Mode switch {}, ratio base {}%", closed, config.ratio_base_pct);

        let controller = LineController::new(&EVENTS, calibration, config);

        let dma1 = Dma::new(dp.DMA1);
        dma::enable_mux1();
        let sensor_bar = sensor_bar::SensorBar::new(dp.ADC1, &clock_cfg);

        let encoder = encoder::PulseInput::new();
        defmt::debug!("ENCODER: Input level high: {}", encoder.is_high());

        let mut tick_timer = Timer::new_tim4(dp.TIM4, TICK_FREQ, Default::default(), &clock_cfg);
        tick_timer.enable_interrupt(TimerInterrupt::Update);
        tick_timer.enable();

        (
            Shared {},
            Local {
                tick_timer,
                sensor_bar,
                encoder,
                dma1,
                controller,
                store,
                motors,
                servo,
                learn_button,
                mode,
                last_state: ControlState::StraightLine,
            },
        )
    }

    #[task(binds = TIM4, local = [tick_timer, sensor_bar], priority = 3)]
    fn on_tick(cx: on_tick::Context) {
        cx.local.tick_timer.clear_interrupt(TimerInterrupt::Update);
        EVENTS.on_tick();

        // Start the next sweep of the sensor bar
        unsafe { cx.local.sensor_bar.begin_read(&mut SENSOR_BUF) };
    }

    #[task(binds = EXTI4, local = [encoder], priority = 3)]
    fn on_encoder_edge(cx: on_encoder_edge::Context) {
        cx.local.encoder.clear();
        EVENTS.on_pulse();
    }

    #[task(binds = DMA1_CH1, local = [dma1], priority = 2)]
    fn on_sensors_read(cx: on_sensors_read::Context) {
        dma::clear_interrupt(
            DmaPeriph::Dma1,
            sensor_bar::DMA_CHANNEL,
            DmaInterrupt::TransferComplete,
        );
        cx.local.dma1.stop(DmaChannel::C1);

        let raw = sensor_bar::SensorBar::readings(unsafe { &SENSOR_BUF });
        // A cycle still running drops this sweep
        control::spawn(raw).ok();
    }

    #[task(priority = 1, local = [controller, store, motors, servo, learn_button, mode, last_state])]
    async fn control(cx: control::Context, raw: RawReadings) {
        let finished = match cx.local.mode {
            Mode::Learning { calibrator, armed } => {
                calibrator.sample(&raw);
                if cx.local.learn_button.is_high() {
                    *armed = true;
                    None
                } else if *armed {
                    Some(core::mem::take(calibrator).finish())
                } else {
                    None
                }
            }
            Mode::Running => {
                let out = cx.local.controller.tick(&raw);
                cx.local.servo.set_position(out.servo);
                cx.local.motors.apply(&out.drive);

                if out.state != *cx.local.last_state {
                    defmt::info!("STATE: {} (sensors {=u8:#b})", out.code, out.sensors.bits());
                    *cx.local.last_state = out.state;
                }
                None
            }
        };

        if let Some(calibration) = finished {
            if let Err(err) = calibration.save(cx.local.store) {
                defmt::warn!("CALIBRATION: Saving failed, kept for this run only: {}", err);
            }
            cx.local.controller.recalibrate(calibration);
            *cx.local.last_state = cx.local.controller.start_in(ControlState::StraightLine.code());
            *cx.local.mode = Mode::Running;
        }
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
