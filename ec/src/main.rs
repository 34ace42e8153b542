#![no_main]
#![no_std]

// note: to get vscode to reload file, do shift-ctrl-p, 'reload window'. developer:Reload window

extern crate betrusted_hal;
extern crate utralib;

use core::panic::PanicInfo;
use debug::{logln, UartSink, LL};
use netcore::platform::{Clock, Platform};
use netcore::{BoardConfig, NetCore};
use riscv_rt::entry;
use utralib::generated::{utra, CSR, HW_CRG_BASE};

mod config_store;
mod spi;
mod uart;

use config_store::EepromConfigStore;
use spi::PicoRvSpi;
use uart::DebugUart;

const LOG_LEVEL: LL = LL::Debug;

/// Locally-administered MAC address for this board.
const MAC_ADDRESS: [u8; 6] = [0x02, 0x00, 0xBE, 0x7E, 0x57, 0xEC];

#[panic_handler]
fn panic(_panic: &PanicInfo<'_>) -> ! {
    loop {}
}

struct DebugUartSink;

impl UartSink for DebugUartSink {
    fn putc(&self, c: u8) {
        uart::DebugUart::new().write_raw(c);
    }
}

static DEBUG_SINK: DebugUartSink = DebugUartSink;

/// Disarm the hardware watchdog. The teacher kicks this from a ticktimer
/// interrupt handler; since nothing else here needs sub-second interrupt
/// latency, it's kicked once per main-loop pass instead.
fn kick_watchdog() {
    let mut crg_csr = CSR::new(HW_CRG_BASE as *mut u32);
    crg_csr.wfo(utra::crg::WATCHDOG_RESET_CODE, 0x600d);
    crg_csr.wfo(utra::crg::WATCHDOG_RESET_CODE, 0xc0de);
}

struct BoardClock;

impl Clock for BoardClock {
    fn now_ms(&self) -> u32 {
        betrusted_hal::hal_time::get_time_ms()
    }
}

struct Board {
    bus: PicoRvSpi,
    store: EepromConfigStore,
    uart: DebugUart,
    clock: BoardClock,
}

impl Platform for Board {
    type Bus = PicoRvSpi;
    type Store = EepromConfigStore;
    type Uart = DebugUart;
    type Clock = BoardClock;

    fn bus(&mut self) -> &mut Self::Bus {
        &mut self.bus
    }

    fn store(&mut self) -> &mut Self::Store {
        &mut self.store
    }

    fn uart(&mut self) -> &mut Self::Uart {
        &mut self.uart
    }

    fn clock(&self) -> &Self::Clock {
        &self.clock
    }

    /// Stop kicking the watchdog and spin: it fires on its own within one
    /// period once nothing calls `kick_watchdog` anymore.
    fn reboot(&mut self) -> ! {
        logln!(LL::Info, "rebooting");
        unsafe { riscv::interrupt::disable() };
        loop {
            unsafe { riscv::asm::wfi() };
        }
    }
}

#[entry]
fn main() -> ! {
    debug::set_sink(&DEBUG_SINK);
    debug::set_log_level(LOG_LEVEL);
    logln!(LL::Info, "\r\n====NETCORE==0A");

    betrusted_hal::hal_time::time_init();
    spi::spi_standby();

    let config = BoardConfig {
        mac: MAC_ADDRESS,
        filter_mode: netcore::mac_phy::FILTER_UNICAST | netcore::mac_phy::FILTER_BROADCAST,
        prng_seed: [
            0x243f, 0x6a88, 0x85a3, 0x08d3, 0x1319, 0x8a2e, 0x0370, 0x7344,
        ],
    };

    let mut board = Board {
        bus: PicoRvSpi::new(),
        store: EepromConfigStore::new(),
        uart: DebugUart::new(),
        clock: BoardClock,
    };

    let mut core = NetCore::new(&mut board, &config);
    logln!(LL::Debug, "netcore up");

    let mut last_second = board.clock().now_ms();

    loop {
        kick_watchdog();
        core.poll_console(&mut board);
        core.poll_packet(&mut board);

        let now = board.clock().now_ms();
        if now.wrapping_sub(last_second) >= 1000 {
            last_second = now;
            core.on_second_tick(&mut board);
        }
    }
}
