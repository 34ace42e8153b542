//! Bit-banged SPI master over the PicoRV bitbang register, generalized from
//! the flash-specific opcode table into an arbitrary byte transfer so it can
//! drive the Ethernet controller instead. Same bank/mode/CS register protocol
//! as the teacher's SPI-flash driver, one bit at a time.

use netcore::mac_phy::SpiBus;
use utralib::generated::*;

const OE_MASK_1BIT: u32 = 0x1;

pub struct PicoRvSpi;

impl PicoRvSpi {
    pub fn new() -> Self {
        PicoRvSpi
    }
}

fn write_byte(spicsr: &mut CSR<u32>, byte: u8) {
    let mut sr = byte;
    for _ in 0..8 {
        let bit = if sr & 0x80 != 0 { 1 } else { 0 };
        spicsr.wo(
            utra::picorvspi::WDATA,
            spicsr.ms(utra::picorvspi::WDATA_OE, OE_MASK_1BIT)
                | spicsr.ms(utra::picorvspi::WDATA_DATA, bit),
        );
        sr <<= 1;
    }
}

fn read_byte(spicsr: &mut CSR<u32>) -> u8 {
    let mut byte: u8 = 0;
    for _ in 0..8 {
        byte <<= 1;
        byte |= ((spicsr.rf(utra::picorvspi::RDATA_DATA) >> 1) & 0x1) as u8;
        spicsr.wfo(utra::picorvspi::WDATA_OE, 0x0);
    }
    byte
}

impl SpiBus for PicoRvSpi {
    /// One CS-bracketed exchange: every byte of `tx` goes out while the same
    /// number of bytes come back into `rx` (full duplex, same as the chip's
    /// register protocol expects). `rx` may be shorter than `tx` when the
    /// caller doesn't care about the reply to its own command bytes.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) {
        let mut spicsr = CSR::new(HW_PICORVSPI_BASE as *mut u32);

        spicsr.wo(
            utra::picorvspi::MODE,
            spicsr.ms(utra::picorvspi::MODE_BITBANG, 1) | spicsr.ms(utra::picorvspi::MODE_CSN, 1),
        );
        spicsr.wo(
            utra::picorvspi::MODE,
            spicsr.ms(utra::picorvspi::MODE_BITBANG, 1) | spicsr.ms(utra::picorvspi::MODE_CSN, 0),
        );

        for (i, &b) in tx.iter().enumerate() {
            write_byte(&mut spicsr, b);
            if let Some(slot) = rx.get_mut(i) {
                *slot = read_byte(&mut spicsr);
            }
        }
        for slot in rx.iter_mut().skip(tx.len()) {
            *slot = read_byte(&mut spicsr);
        }

        spicsr.wo(
            utra::picorvspi::MODE,
            spicsr.ms(utra::picorvspi::MODE_BITBANG, 1) | spicsr.ms(utra::picorvspi::MODE_CSN, 1),
        );
        spicsr.wfo(utra::picorvspi::WDATA_OE, 0);
        spicsr.wo(
            utra::picorvspi::MODE,
            spicsr.ms(utra::picorvspi::MODE_BITBANG, 0) | spicsr.ms(utra::picorvspi::MODE_CSN, 1),
        );
    }

    fn wait_us(&mut self, us: u32) {
        betrusted_hal::hal_time::delay_us(us as u64);
    }
}

pub fn spi_standby() {
    let mut spicsr = CSR::new(HW_PICORVSPI_BASE as *mut u32);
    spicsr.wfo(utra::picorvspi::WDATA_OE, 0);
}
