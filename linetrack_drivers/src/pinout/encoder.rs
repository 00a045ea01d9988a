use super::PinDef;
use super::{PinMode, Port};

/// Wheel encoder pulse input, EXTI line 4
pub const PULSE: PinDef = PinDef {
    port: Port::B,
    pin: 4,
    mode: PinMode::Input,
};
