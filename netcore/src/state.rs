//! Owns every protocol handler and drives them from the three events a
//! board's main loop actually has: a console byte arrived, a second
//! elapsed, or a frame is waiting in the controller's RX ring. Nothing in
//! this module touches hardware directly — every external effect goes
//! through [`Platform`].

use crate::config::NetworkIdentity;
use crate::console::{self, Action, LineBuffer, LineEvent};
use crate::dhcp::{self, DhcpClient, Mode};
use crate::mac_phy::{Enc28j60, MAX_FRAME};
use crate::platform::Platform;
use crate::prng::NetPrng;
use crate::tcp::{self, TcpHandler};
use crate::timers::{TimerId, TimerService};
use crate::wire::{self, arp, Disposition};

const LINE_CAPACITY: usize = 96;
const ECHO_PORT: u16 = 1024;
const ECHO_REPLY: &[u8] = b"Received\0";

/// Everything a board needs to supply once, at bring-up, to construct a
/// [`NetCore`]. `filter_mode` is passed straight through to
/// [`Enc28j60::init`] (combine `mac_phy::FILTER_*`/`DUPLEX_FULL` bits).
pub struct BoardConfig {
    pub mac: [u8; 6],
    pub filter_mode: u16,
    pub prng_seed: [u16; 8],
}

/// The whole embedded network stack: controller driver, protocol state
/// machines, and the one shared packet buffer they all stage frames into.
pub struct NetCore {
    identity: NetworkIdentity,
    dhcp: DhcpClient,
    tcp: TcpHandler,
    mac_phy: Enc28j60,
    timers: TimerService,
    prng: NetPrng,
    line: LineBuffer<LINE_CAPACITY>,
    packet: [u8; MAX_FRAME],
    link_up: bool,
}

impl NetCore {
    /// Bring the controller up, load the persisted identity, and kick off
    /// DHCP discovery if the config store has it enabled. Mirrors the
    /// original's boot sequence of `etherInit` followed by a conditional
    /// `dhcpEnable`.
    pub fn new(platform: &mut impl Platform, config: &BoardConfig) -> Self {
        let identity = NetworkIdentity::load(platform.store(), config.mac);
        let mut mac_phy = Enc28j60::new();
        mac_phy.init(platform.bus(), &config.mac, config.filter_mode);

        let mut core = NetCore {
            identity,
            dhcp: DhcpClient::new(config.mac),
            tcp: TcpHandler::new(),
            mac_phy,
            timers: TimerService::new(),
            prng: NetPrng::new_from(&config.prng_seed),
            line: LineBuffer::new(),
            packet: [0u8; MAX_FRAME],
            link_up: false,
        };

        if core.identity.dhcp_enabled {
            let outcome = core.dhcp.enable(&mut core.packet, &mut core.prng, &mut core.timers);
            core.transmit_dhcp_outcome(platform, outcome);
        }

        core
    }

    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }

    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Drain console input up to and including the first completed line,
    /// if any is waiting. Matches §4.8's "drain one console line per pass"
    /// ordering: only ever acts on a single command per call.
    pub fn poll_console(&mut self, platform: &mut impl Platform) {
        loop {
            let byte = match platform.uart().try_read() {
                Some(b) => b,
                None => return,
            };
            match self.line.push(byte) {
                LineEvent::Pending => {}
                LineEvent::Backspace => {
                    platform.uart().write(0x08);
                    platform.uart().write(b' ');
                    platform.uart().write(0x08);
                }
                LineEvent::Complete => {
                    platform.uart().write(b'\r');
                    platform.uart().write(b'\n');
                    let action = console::dispatch(self.line.as_str(), &mut self.identity, platform.store(), platform.uart());
                    self.line.clear();
                    self.apply_console_action(platform, action);
                    return;
                }
            }
        }
    }

    fn apply_console_action(&mut self, platform: &mut impl Platform, action: Action) {
        match action {
            Action::None => {}
            Action::ShowIfconfig => {
                console::print_ifconfig(&self.identity, self.link_up, platform.uart());
            }
            Action::Reboot => platform.reboot(),
            Action::DhcpOn => {
                let outcome = self.dhcp.enable(&mut self.packet, &mut self.prng, &mut self.timers);
                self.transmit_dhcp_outcome(platform, outcome);
            }
            Action::DhcpOff => {
                self.dhcp.disable(&mut self.timers);
                self.identity = NetworkIdentity::load(platform.store(), self.identity.mac);
            }
            Action::DhcpRefresh => {
                let outcome = self.dhcp.refresh(&mut self.packet, &mut self.prng, &mut self.timers);
                self.transmit_dhcp_outcome(platform, outcome);
            }
            Action::DhcpRelease => {
                let outcome = self.dhcp.release(&mut self.packet, &self.identity, &mut self.timers);
                self.transmit_dhcp_outcome(platform, outcome);
                self.identity = NetworkIdentity::load(platform.store(), self.identity.mac);
            }
        }
    }

    /// Act on whatever timers fired since the last tick, and refresh the
    /// cached link state. Called once per elapsed second.
    pub fn on_second_tick(&mut self, platform: &mut impl Platform) {
        self.link_up = self.mac_phy.link_up(platform.bus());

        let fired = self.timers.tick();
        for &id in fired.as_slice() {
            let outcome = match id {
                TimerId::DhcpRetry => self.dhcp.on_retry(&mut self.packet, &self.identity, &mut self.prng, &mut self.timers),
                TimerId::DhcpT1 => self.dhcp.on_t1(&mut self.packet, &self.identity, &mut self.prng, &mut self.timers),
                TimerId::DhcpT2 => self.dhcp.on_t2(&mut self.packet, &self.identity, &mut self.prng, &mut self.timers),
                TimerId::DhcpLeaseExpiry => self.dhcp.on_lease_expiry(&mut self.identity, &mut self.timers),
                TimerId::DhcpSafeToUse => self.dhcp.on_safe_to_use(),
                TimerId::DhcpDeclineWait => self.dhcp.on_decline_wait_elapsed(&mut self.packet, &mut self.prng, &mut self.timers),
            };
            self.transmit_dhcp_outcome(platform, outcome);
        }
    }

    fn transmit_dhcp_outcome(&mut self, platform: &mut impl Platform, outcome: dhcp::Outcome) {
        match outcome {
            dhcp::Outcome::NoAction | dhcp::Outcome::Released => {}
            dhcp::Outcome::TransmitBroadcast(len) => {
                self.mac_phy.put_packet(platform.bus(), &self.packet[..len]);
            }
            dhcp::Outcome::TransmitUnicast { len, .. } => {
                self.mac_phy.put_packet(platform.bus(), &self.packet[..len]);
            }
            dhcp::Outcome::Bound { lease_seconds } => {
                debug::logln!(debug::LL::Info, "dhcp bound, lease {}s", lease_seconds);
            }
            dhcp::Outcome::LeaseLost => {
                debug::logln!(debug::LL::Warn, "dhcp lease lost, restarting discovery");
            }
        }
    }

    /// Copy one queued frame out of the controller, if any, and dispatch
    /// it. Checks the overflow latch first, per the error policy: a
    /// receive overflow blinks an indicator and clears, then processing
    /// continues normally with whatever frame (if any) is queued.
    pub fn poll_packet(&mut self, platform: &mut impl Platform) {
        if self.mac_phy.overflow(platform.bus()) {
            platform.indicate_overflow();
        }
        if !self.mac_phy.data_available(platform.bus()) {
            return;
        }
        let size = self.mac_phy.get_packet(platform.bus(), &mut self.packet);

        if self.is_arp_reply_conflict(size) {
            let outcome = self.dhcp.on_arp_conflict(&mut self.packet, &self.identity, &mut self.timers);
            self.transmit_dhcp_outcome(platform, outcome);
            return;
        }

        match wire::classify(&self.packet[..size], &self.identity.mac, &self.identity.ip) {
            Disposition::ArpRequest => {
                let len = arp::send_arp_response(&mut self.packet[..size], &self.identity.mac, &self.identity.ip);
                self.mac_phy.put_packet(platform.bus(), &self.packet[..len]);
            }
            Disposition::IcmpEchoRequest => {
                let len = wire::icmp::send_ping_response(&mut self.packet[..size], &self.identity.mac, &self.identity.ip);
                self.mac_phy.put_packet(platform.bus(), &self.packet[..len]);
            }
            Disposition::UdpUnicast | Disposition::UdpBroadcast => {
                self.handle_udp(platform, size);
            }
            Disposition::TcpSyn | Disposition::TcpAck | Disposition::TcpPshAck => {
                match self.tcp.handle_segment(&mut self.packet[..size], &self.identity.mac, &self.identity.ip) {
                    tcp::Outcome::Reply(len) => {
                        self.mac_phy.put_packet(platform.bus(), &self.packet[..len]);
                    }
                    tcp::Outcome::NoReply | tcp::Outcome::ReplyThenFin { .. } => {}
                }
            }
            Disposition::TcpFinAck => {
                if let tcp::Outcome::ReplyThenFin { ack_len } =
                    self.tcp.handle_segment(&mut self.packet[..size], &self.identity.mac, &self.identity.ip)
                {
                    self.mac_phy.put_packet(platform.bus(), &self.packet[..ack_len]);
                    let fin_len = self.tcp.build_second_finack(&mut self.packet);
                    self.mac_phy.put_packet(platform.bus(), &self.packet[..fin_len]);
                }
            }
            Disposition::DropShort
            | Disposition::DropEtherType
            | Disposition::DropIpChecksum
            | Disposition::DropProtocol
            | Disposition::Forwarded => {}
        }
    }

    /// `classify` only ever recognizes ARP *requests* (see `wire::classify`),
    /// so a reply to our own gratuitous announcement — the one frame DHCP
    /// conflict detection needs — has to be picked out here instead.
    fn is_arp_reply_conflict(&self, size: usize) -> bool {
        let buf = &self.packet[..size];
        size >= wire::ARP_FRAME_LEN
            && wire::ether::ethertype(buf) == wire::ETHERTYPE_ARP
            && arp::op(buf) == arp::OP_REPLY
            && arp::sender_ip(buf) == self.dhcp.offered_ip()
    }

    fn handle_udp(&mut self, platform: &mut impl Platform, size: usize) {
        let buf = &self.packet[..size];
        let dport = wire::udp::dst_port(buf);

        if dport == ECHO_PORT {
            let off = wire::udp::payload_offset(buf);
            let len = (wire::udp::length(buf) as usize).saturating_sub(8);
            let end = (off + len).min(size);
            let is_on = &self.packet[off..end] == b"on";
            let is_off = &self.packet[off..end] == b"off";
            if is_on || is_off {
                platform.indicate_udp_activity(is_on);
            }
            let reply_len = wire::udp::send_udp_response(&mut self.packet[..size], &self.identity.mac, &self.identity.ip, ECHO_REPLY);
            self.mac_phy.put_packet(platform.bus(), &self.packet[..reply_len]);
        } else if dport == wire::dhcp::CLIENT_PORT {
            self.dispatch_dhcp_frame(platform);
        }
    }

    fn dispatch_dhcp_frame(&mut self, platform: &mut impl Platform) {
        let prev_mode = self.dhcp.mode();
        let outcome = self.dhcp.handle_frame(&mut self.packet, &mut self.identity, &mut self.prng, &mut self.timers);
        self.transmit_dhcp_outcome(platform, outcome);

        if prev_mode == Mode::Requesting && self.dhcp.mode() == Mode::AwaitingSafe {
            let len = self.dhcp.build_gratuitous_arp(&mut self.packet);
            self.mac_phy.put_packet(platform.bus(), &self.packet[..len]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::console::ConsoleIo;
    use crate::mac_phy::SpiBus;
    use crate::platform::{Clock, UartIo};

    struct MemStore {
        slots: [u32; 5],
    }
    impl ConfigStore for MemStore {
        fn read(&self, slot: u8) -> u32 {
            self.slots[slot as usize]
        }
        fn write(&mut self, slot: u8, value: u32) {
            self.slots[slot as usize] = value;
        }
    }

    struct FakeBus;
    impl SpiBus for FakeBus {
        fn transfer(&mut self, _tx: &[u8], rx: &mut [u8]) {
            for b in rx.iter_mut() {
                *b = 0;
            }
        }
        fn wait_us(&mut self, _us: u32) {}
    }

    struct FakeUart {
        out: [u8; 256],
        len: usize,
    }
    impl UartIo for FakeUart {
        fn try_read(&mut self) -> Option<u8> {
            None
        }
        fn write(&mut self, b: u8) {
            if self.len < self.out.len() {
                self.out[self.len] = b;
                self.len += 1;
            }
        }
    }
    impl ConsoleIo for FakeUart {
        fn write_byte(&mut self, b: u8) {
            UartIo::write(self, b);
        }
    }

    struct FakeClock;
    impl Clock for FakeClock {
        fn now_ms(&self) -> u32 {
            0
        }
    }

    struct TestBoard {
        bus: FakeBus,
        store: MemStore,
        uart: FakeUart,
        clock: FakeClock,
        rebooted: bool,
    }

    impl Platform for TestBoard {
        type Bus = FakeBus;
        type Store = MemStore;
        type Uart = FakeUart;
        type Clock = FakeClock;

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
        fn reboot(&mut self) -> ! {
            self.rebooted = true;
            loop {}
        }
    }

    fn board() -> TestBoard {
        TestBoard {
            bus: FakeBus,
            store: MemStore { slots: [0; 5] },
            uart: FakeUart { out: [0; 256], len: 0 },
            clock: FakeClock,
            rebooted: false,
        }
    }

    #[test]
    fn new_leaves_dhcp_static_when_store_disables_it() {
        let mut platform = board();
        let config = BoardConfig { mac: [2, 3, 4, 5, 6, 7], filter_mode: 0, prng_seed: [1, 2, 3, 4, 5, 6, 7, 8] };
        let core = NetCore::new(&mut platform, &config);
        assert_eq!(core.dhcp.mode(), Mode::Static);
        assert!(!core.identity().dhcp_enabled);
    }

    #[test]
    fn new_starts_discovery_when_store_enables_dhcp() {
        let mut platform = board();
        platform.store.slots[crate::config::SLOT_DHCP_FLAG as usize] = 1;
        let config = BoardConfig { mac: [2, 3, 4, 5, 6, 7], filter_mode: 0, prng_seed: [1, 2, 3, 4, 5, 6, 7, 8] };
        let core = NetCore::new(&mut platform, &config);
        assert_eq!(core.dhcp.mode(), Mode::Selecting);
    }

    #[test]
    fn console_line_triggers_ifconfig_action_without_panicking() {
        let mut platform = board();
        let config = BoardConfig { mac: [2, 3, 4, 5, 6, 7], filter_mode: 0, prng_seed: [1, 2, 3, 4, 5, 6, 7, 8] };
        let mut core = NetCore::new(&mut platform, &config);
        for b in b"ifconfig\r" {
            core.line.push(*b);
        }
        core.apply_console_action(&mut platform, Action::ShowIfconfig);
        assert!(platform.uart.len > 0);
    }
}
