//! Reflectance sensor bar sampled as one ADC1 regular sequence moved by DMA1 channel 1.
use hal::{
    adc::{Adc, AdcDevice, Align, InputType, SampleTime},
    clocks::Clocks,
    dma::{self, DmaChannel, DmaInput, DmaPeriph},
    pac::ADC1,
};

use linetrack_algo::sensors::{RawReadings, SENSOR_COUNT};

use super::pinout::sensors::{CHANNELS, INPUTS};

/// DMA channel the conversions land on.
pub const DMA_CHANNEL: DmaChannel = DmaChannel::C1;

pub struct SensorBar {
    adc: Adc<ADC1>,
}

impl SensorBar {
    pub fn new(adc1: ADC1, clock_cfg: &Clocks) -> Self {
        for input in INPUTS.iter() {
            input.init();
        }

        let mut adc = Adc::new_adc1(adc1, AdcDevice::One, Default::default(), clock_cfg.systick());

        for (i, &channel) in CHANNELS.iter().enumerate() {
            adc.set_sequence(channel, i as u8 + 1);
            adc.set_input_type(channel, InputType::SingleEnded);
            adc.set_sample_time(channel, SampleTime::T47);
        }
        adc.set_sequence_len(SENSOR_COUNT as u8);
        adc.set_align(Align::Right);

        dma::mux(DmaPeriph::Dma1, DMA_CHANNEL, DmaInput::Adc1);

        SensorBar { adc }
    }

    /// Starts converting the whole bar into `buf`, completion raises DMA1_CH1.
    ///
    /// # Safety
    /// `buf` is written by DMA until the transfer completes and must not be read before.
    pub unsafe fn begin_read(&mut self, buf: &'static mut [u16; SENSOR_COUNT]) {
        self.adc.read_dma(
            buf,
            &CHANNELS,
            DMA_CHANNEL,
            Default::default(),
            DmaPeriph::Dma1,
        );
    }

    /// Converts a finished 12 bit conversion buffer to the 10 bit sensor scale.
    pub fn readings(buf: &[u16; SENSOR_COUNT]) -> RawReadings {
        let mut raw = [0; SENSOR_COUNT];
        for (value, &sample) in raw.iter_mut().zip(buf.iter()) {
            *value = sample >> 2;
        }
        raw
    }
}
