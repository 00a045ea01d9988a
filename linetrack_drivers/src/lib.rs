#![no_std]

pub mod encoder;
pub mod flash_store;
pub mod pinout;
pub mod pwm;
pub mod sensor_bar;
