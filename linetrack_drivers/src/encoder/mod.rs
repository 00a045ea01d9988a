//! Wheel encoder: every rising edge on the pulse input raises EXTI4.
use hal::gpio::{self, Edge, Pin, Pull};

use super::pinout;

pub struct PulseInput {
    pin: Pin,
}

impl PulseInput {
    pub fn new() -> Self {
        let mut pin = pinout::encoder::PULSE.init();
        pin.pull(Pull::Up);
        pin.enable_interrupt(Edge::Rising);
        PulseInput { pin }
    }

    /// Acknowledges the edge, call first thing in the EXTI handler.
    #[inline(always)]
    pub fn clear(&mut self) {
        gpio::clear_exti_interrupt(pinout::encoder::PULSE.pin());
    }

    pub fn is_high(&self) -> bool {
        self.pin.is_high()
    }
}
