use netcore::console::ConsoleIo;
use netcore::platform::UartIo;
use utralib::generated::{utra, CSR};

pub struct DebugUart {
    csr: CSR<u8>,
}

impl DebugUart {
    pub fn new() -> Self {
        DebugUart {
            csr: CSR::new(utra::uart::HW_UART_BASE as *mut u8),
        }
    }

    /// Blocking write usable from the `&self`-only `debug::UartSink` seam.
    pub fn write_raw(&self, b: u8) {
        let mut csr = CSR::new(utra::uart::HW_UART_BASE as *mut u8);
        while csr.rf(utra::uart::TXFULL_TXFULL) != 0 {}
        csr.wfo(utra::uart::RXTX_RXTX, b as u32);
    }
}

impl UartIo for DebugUart {
    fn try_read(&mut self) -> Option<u8> {
        let no_pending = self.csr.rf(utra::uart::EV_PENDING_RX) == 0;
        let empty = self.csr.rf(utra::uart::RXEMPTY_RXEMPTY) != 0;
        if no_pending && empty {
            return None;
        }
        let b = self.csr.rf(utra::uart::RXTX_RXTX) as u8;
        self.csr.wfo(utra::uart::EV_PENDING_RX, 1);
        Some(b)
    }

    fn write(&mut self, b: u8) {
        while self.csr.rf(utra::uart::TXFULL_TXFULL) != 0 {}
        self.csr.wfo(utra::uart::RXTX_RXTX, b as u32);
    }
}

impl ConsoleIo for DebugUart {
    fn write_byte(&mut self, b: u8) {
        UartIo::write(self, b);
    }
}
