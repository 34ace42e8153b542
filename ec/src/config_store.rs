//! Persists the five network config slots to an external I2C EEPROM rather
//! than the board's own flash, since this board's SPI-flash bus is already
//! claimed by [`crate::spi::PicoRvSpi`] for the Ethernet controller. Grounded
//! on `betrusted_hal::hal_i2c::Hardi2c`, the only I2C controller driver the
//! teacher carries.

use betrusted_hal::hal_i2c::Hardi2c;
use netcore::config::ConfigStore;

const EEPROM_ADDR: u8 = 0x50;
const I2C_TIMEOUT_MS: u32 = 50;
const SLOT_STRIDE: u8 = 4;

pub struct EepromConfigStore;

impl EepromConfigStore {
    pub fn new() -> Self {
        EepromConfigStore
    }

    fn eeprom_offset(slot: u8) -> u8 {
        slot * SLOT_STRIDE
    }
}

impl ConfigStore for EepromConfigStore {
    fn read(&self, slot: u8) -> u32 {
        let mut i2c = Hardi2c::new();
        let offset = [Self::eeprom_offset(slot)];
        let mut value = [0u8; 4];
        i2c.i2c_controller(EEPROM_ADDR, Some(&offset), None, I2C_TIMEOUT_MS);
        i2c.i2c_controller(EEPROM_ADDR, None, Some(&mut value), I2C_TIMEOUT_MS);
        u32::from_be_bytes(value)
    }

    fn write(&mut self, slot: u8, value: u32) {
        let mut i2c = Hardi2c::new();
        let bytes = value.to_be_bytes();
        let mut payload = [0u8; 5];
        payload[0] = Self::eeprom_offset(slot);
        payload[1..].copy_from_slice(&bytes);
        i2c.i2c_controller(EEPROM_ADDR, Some(&payload), None, I2C_TIMEOUT_MS);
        // page write cycle time
        betrusted_hal::hal_time::delay_ms(5);
    }
}
