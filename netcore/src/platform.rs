//! The board-bring-up boundary: every external collaborator the core talks
//! to through a narrow trait instead of owning it directly.
//!
//! `Platform` is the one thing a concrete board crate (`ec`) implements;
//! everything else in this crate is driven purely through it, so `netcore`
//! itself stays free of any register or peripheral access.

use crate::config::ConfigStore;
use crate::console::ConsoleIo;
use crate::mac_phy::SpiBus;

/// A free-running millisecond counter. Used by the platform loop to decide
/// when a second has elapsed (the 1 Hz tick `NetCore` expects), mirroring
/// the teacher's own `hal_time::get_time_ms` polling rather than a hardware
/// interrupt callback into this crate.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// The operator console's byte stream, independent of whatever prints
/// `debug`'s log macros go to on the same board.
pub trait UartIo {
    fn try_read(&mut self) -> Option<u8>;
    fn write(&mut self, b: u8);
}

/// Bundles the external collaborators kept out of the core (board bring-up,
/// serial bus driver, console UART driver, persistence primitive) behind one
/// object `NetCore` is driven through.
pub trait Platform {
    type Bus: SpiBus;
    type Store: ConfigStore;
    type Uart: UartIo + ConsoleIo;
    type Clock: Clock;

    fn bus(&mut self) -> &mut Self::Bus;
    fn store(&mut self) -> &mut Self::Store;
    fn uart(&mut self) -> &mut Self::Uart;
    fn clock(&self) -> &Self::Clock;

    /// Board-specific restart (watchdog kick, `riscv::asm::ebreak`,
    /// whatever the concrete board uses); never returns.
    fn reboot(&mut self) -> !;

    /// Receive overflow happened this pass. Default no-op; a board with a
    /// status LED overrides it to blink one as a visible warning.
    fn indicate_overflow(&mut self) {}

    /// The UDP echo service on port 1024 turned its indicator on or off
    /// (payload `"on"`/`"off"`). Default no-op for boards with nothing to
    /// light.
    fn indicate_udp_activity(&mut self, _on: bool) {}
}
