//! Steering servo and rear motor bridge pins.
use super::PinDef;
use super::{PinMode, Port};

/// Steering servo signal, TIM3 channel 1
pub const SERVO: PinDef = PinDef {
    port: Port::A,
    pin: 6,
    mode: PinMode::Alt(2),
};

/// Left motor PWM, TIM2 channel 3
pub const LEFT_PWM: PinDef = PinDef {
    port: Port::B,
    pin: 10,
    mode: PinMode::Alt(1),
};

/// Right motor PWM, TIM2 channel 4
pub const RIGHT_PWM: PinDef = PinDef {
    port: Port::B,
    pin: 11,
    mode: PinMode::Alt(1),
};

/// Left motor direction, high drives backwards
pub const LEFT_DIR: PinDef = PinDef {
    port: Port::B,
    pin: 2,
    mode: PinMode::Output,
};

/// Right motor direction, high drives backwards
pub const RIGHT_DIR: PinDef = PinDef {
    port: Port::A,
    pin: 4,
    mode: PinMode::Output,
};
