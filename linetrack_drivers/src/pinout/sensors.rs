//! Reflectance sensor bar, the learn button and the mode switch.
use super::PinDef;
use super::{PinMode, Port};

/// ADC1 channel of every sensor, index 0 is the rightmost sensor.
pub const CHANNELS: [u8; 8] = [1, 2, 3, 4, 6, 7, 8, 9];

/// Analog inputs in the order of [`CHANNELS`].
pub const INPUTS: [PinDef; 8] = [
    PinDef::new(Port::A, 0, PinMode::Analog),
    PinDef::new(Port::A, 1, PinMode::Analog),
    PinDef::new(Port::A, 2, PinMode::Analog),
    PinDef::new(Port::A, 3, PinMode::Analog),
    PinDef::new(Port::C, 0, PinMode::Analog),
    PinDef::new(Port::C, 1, PinMode::Analog),
    PinDef::new(Port::C, 2, PinMode::Analog),
    PinDef::new(Port::C, 3, PinMode::Analog),
];

/// Learn button, active low. Held at power up it starts a calibration session.
pub const LEARN_BUTTON: PinDef = PinDef {
    port: Port::C,
    pin: 13,
    mode: PinMode::Input,
};

/// Four position mode switch, contact 0 first. A closed contact pulls its pin low.
pub const MODE_SWITCH: [PinDef; 4] = [
    PinDef::new(Port::B, 12, PinMode::Input),
    PinDef::new(Port::B, 13, PinMode::Input),
    PinDef::new(Port::B, 14, PinMode::Input),
    PinDef::new(Port::B, 15, PinMode::Input),
];
