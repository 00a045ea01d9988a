//! Calibration pairs kept in the last flash page: the eight minima first, then the eight maxima.
use hal::flash::{Bank, Flash};

use linetrack_algo::sensors::{CalibrationStore, SENSOR_COUNT};

/// Last 2 KiB page of the 128 KiB part.
pub const PAGE: usize = 63;
const PAGE_SIZE: usize = 2048;
const FLASH_BASE: usize = 0x0800_0000;
const WORDS: usize = 2 * SENSOR_COUNT;

#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum FlashError {
    /// Page erase failed
    Erase,
    /// Programming the page failed
    Program,
    /// Sensor index outside the bar
    Sensor(usize),
}

pub struct FlashStore {
    flash: Flash,
    words: [u16; WORDS],
}

impl FlashStore {
    pub fn new(flash: Flash) -> Self {
        FlashStore {
            flash,
            words: [u16::MAX; WORDS],
        }
    }

    fn word_address(index: usize) -> *const u16 {
        (FLASH_BASE + PAGE * PAGE_SIZE + 2 * index) as *const u16
    }

    fn read_word(index: usize) -> u16 {
        // Memory mapped flash, the page is only reprogrammed through `commit`
        unsafe { core::ptr::read_volatile(Self::word_address(index)) }
    }
}

impl CalibrationStore for FlashStore {
    type Error = FlashError;

    fn read_pair(&mut self, sensor: usize) -> Result<(u16, u16), FlashError> {
        if sensor >= SENSOR_COUNT {
            return Err(FlashError::Sensor(sensor));
        }
        let min = Self::read_word(sensor);
        let max = Self::read_word(sensor + SENSOR_COUNT);
        self.words[sensor] = min;
        self.words[sensor + SENSOR_COUNT] = max;
        Ok((min, max))
    }

    fn write_pair(&mut self, sensor: usize, min: u16, max: u16) -> Result<(), FlashError> {
        if sensor >= SENSOR_COUNT {
            return Err(FlashError::Sensor(sensor));
        }
        self.words[sensor] = min;
        self.words[sensor + SENSOR_COUNT] = max;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), FlashError> {
        let mut bytes = [0u8; 2 * WORDS];
        for (chunk, word) in bytes.chunks_exact_mut(2).zip(self.words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }

        self.flash
            .erase_page(Bank::B1, PAGE)
            .map_err(|_| FlashError::Erase)?;
        self.flash
            .write_page(Bank::B1, PAGE, &bytes)
            .map_err(|_| FlashError::Program)?;

        defmt::info!("FLASH: Calibration written to page {}", PAGE);
        Ok(())
    }
}
