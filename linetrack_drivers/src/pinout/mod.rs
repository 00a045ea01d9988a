//! Pin assignment of the line tracking car on the STM32G431 board.
use hal::gpio::{Pin, PinMode, Port};

pub mod drive;
pub mod encoder;
pub mod sensors;

/// Represents the definition of a GPIO pin.
pub struct PinDef {
    /// The port to which the pin belongs (e.g., Port::A, Port::B).
    port: Port,
    /// The pin number within the port.
    pin: u8,
    /// The mode of the pin (e.g., Output, Input, Analog, Alternate function).
    mode: PinMode,
}

impl PinDef {
    pub const fn new(port: Port, pin: u8, mode: PinMode) -> PinDef {
        PinDef { port, pin, mode }
    }

    /// Pin number within the port, also the EXTI line of the pin.
    pub const fn pin(&self) -> u8 {
        self.pin
    }

    /// Configures the pin and returns its HAL handle.
    /// # Example
    /// ```ignore
    /// let mut left_dir = pinout::drive::LEFT_DIR.init();
    /// left_dir.set_high();
    /// ```
    pub fn init(&self) -> Pin {
        Pin::new(self.port, self.pin, self.mode)
    }
}
