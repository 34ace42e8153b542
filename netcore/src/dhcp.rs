//! DHCP client state machine (RFC 2131): DISCOVER → OFFER → REQUEST → ACK →
//! BOUND → RENEWING → REBINDING, plus DECLINE and RELEASE.
//!
//! Wire-level encode/decode and the OFFER/ACK predicates live in
//! [`crate::wire::dhcp`]; this module only tracks state, timers, and the
//! transitions between them. Every state exit stops every timer before a
//! new one is armed, per the single cancellation primitive the original
//! relied on.

use crate::config::NetworkIdentity;
use crate::prng::NetPrng;
use crate::timers::{TimerId, TimerService};
use crate::wire::dhcp as wire;
use crate::wire::ipv4;

const RETRY_BASE_S: u32 = 2;
const RETRY_MAX_S: u32 = 16;
const SAFE_TO_USE_S: u32 = 2;
const DECLINE_WAIT_S: u32 = 10;
const BROADCAST_MAC: [u8; 6] = [0xFF; 6];
const BROADCAST_IP: [u8; 4] = [255, 255, 255, 255];
const ZERO_IP: [u8; 4] = [0, 0, 0, 0];

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Mode {
    Static,
    Init,
    Selecting,
    Requesting,
    /// Between a received ACK and the safe-to-use timer firing; BOUND in
    /// every externally visible sense, but still watching for an ARP reply
    /// to the gratuitous announcement.
    AwaitingSafe,
    Bound,
    Renewing,
    Rebinding,
}

/// What the caller needs to do after a state-machine call returns.
#[derive(Copy, Clone)]
pub enum Outcome {
    NoAction,
    TransmitBroadcast(usize),
    TransmitUnicast { mac: [u8; 6], ip: [u8; 4], len: usize },
    Bound { lease_seconds: u32 },
    LeaseLost,
    Released,
}

const HOSTNAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

pub struct DhcpClient {
    mode: Mode,
    mac: [u8; 6],
    xid: u32,
    offered_ip: [u8; 4],
    server_ip: [u8; 4],
    server_mac: [u8; 6],
    lease_seconds: u32,
    hostname: [u8; 8],
    hostname_len: u8,
    retry_count: u8,
}

impl DhcpClient {
    pub const fn new(mac: [u8; 6]) -> Self {
        DhcpClient {
            mode: Mode::Static,
            mac,
            xid: 0,
            offered_ip: ZERO_IP,
            server_ip: ZERO_IP,
            server_mac: [0u8; 6],
            lease_seconds: 0,
            hostname: [0u8; 8],
            hostname_len: 0,
            retry_count: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The address currently offered or held, for comparing against an
    /// inbound ARP reply's sender address when checking for a conflict.
    pub fn offered_ip(&self) -> [u8; 4] {
        self.offered_ip
    }

    pub fn hostname(&self) -> &[u8] {
        &self.hostname[..self.hostname_len as usize]
    }

    fn next_xid(&mut self, prng: &mut NetPrng) -> u32 {
        self.xid = prng.next();
        self.xid
    }

    /// Pick a pseudorandom 5-8 character hostname the first time discovery
    /// runs, so every DISCOVER/REQUEST this session carries the same name.
    fn ensure_hostname(&mut self, prng: &mut NetPrng) {
        if self.hostname_len != 0 {
            return;
        }
        let len = 5 + prng.next_below(4) as u8;
        for slot in self.hostname.iter_mut().take(len as usize) {
            let idx = prng.next_below(HOSTNAME_CHARSET.len() as u32) as usize;
            *slot = HOSTNAME_CHARSET[idx];
        }
        self.hostname_len = len;
    }

    /// RFC 2131 §4.1's recommended randomized exponential backoff: 2s, 4s,
    /// 8s, 16s (capped), each jittered by up to 2s. Resets on every fresh
    /// DISCOVER/REQUEST cycle so a later renewal starts back at 2s.
    fn next_retry_period(&mut self, prng: &mut NetPrng) -> u32 {
        let shift = self.retry_count.min(3);
        let base = (RETRY_BASE_S << shift).min(RETRY_MAX_S);
        self.retry_count = self.retry_count.saturating_add(1);
        base + prng.next_below(3)
    }

    fn arm_retry(&mut self, prng: &mut NetPrng, timers: &mut TimerService) {
        let period = self.next_retry_period(prng);
        timers.arm_one_shot(TimerId::DhcpRetry, period);
    }

    fn start_discovery(&mut self, buf: &mut [u8], prng: &mut NetPrng, timers: &mut TimerService) -> Outcome {
        timers.stop_all();
        self.mode = Mode::Selecting;
        self.offered_ip = ZERO_IP;
        self.retry_count = 0;
        let xid = self.next_xid(prng);
        self.ensure_hostname(prng);
        let hostname_len = self.hostname_len as usize;
        let msg = wire::DhcpMessage {
            message_type: wire::MSG_DISCOVER,
            xid,
            broadcast: true,
            ciaddr: ZERO_IP,
            client_mac: &self.mac,
            requested_ip: None,
            lease_seconds: None,
            server_id: None,
            hostname: Some(&self.hostname[..hostname_len]),
        };
        let len = wire::send_dhcp_packet(buf, &BROADCAST_MAC, &BROADCAST_IP, &ZERO_IP, &msg);
        self.arm_retry(prng, timers);
        Outcome::TransmitBroadcast(len)
    }

    /// The retry timer fired with no reply yet: resend whatever message is
    /// outstanding for the current phase and rearm with the next backoff
    /// step. A no-op outside SELECTING/REQUESTING/RENEWING/REBINDING.
    pub fn on_retry(
        &mut self,
        buf: &mut [u8],
        identity: &NetworkIdentity,
        prng: &mut NetPrng,
        timers: &mut TimerService,
    ) -> Outcome {
        match self.mode {
            Mode::Selecting => {
                let xid = self.xid;
                let hostname_len = self.hostname_len as usize;
                let msg = wire::DhcpMessage {
                    message_type: wire::MSG_DISCOVER,
                    xid,
                    broadcast: true,
                    ciaddr: ZERO_IP,
                    client_mac: &self.mac,
                    requested_ip: None,
                    lease_seconds: None,
                    server_id: None,
                    hostname: Some(&self.hostname[..hostname_len]),
                };
                let len = wire::send_dhcp_packet(buf, &BROADCAST_MAC, &BROADCAST_IP, &ZERO_IP, &msg);
                self.arm_retry(prng, timers);
                Outcome::TransmitBroadcast(len)
            }
            Mode::Requesting => {
                let hostname_len = self.hostname_len as usize;
                let msg = wire::DhcpMessage {
                    message_type: wire::MSG_REQUEST,
                    xid: self.xid,
                    broadcast: true,
                    ciaddr: ZERO_IP,
                    client_mac: &self.mac,
                    requested_ip: Some(self.offered_ip),
                    lease_seconds: Some(self.lease_seconds),
                    server_id: Some(self.server_ip),
                    hostname: Some(&self.hostname[..hostname_len]),
                };
                let len = wire::send_dhcp_packet(buf, &BROADCAST_MAC, &BROADCAST_IP, &ZERO_IP, &msg);
                self.arm_retry(prng, timers);
                Outcome::TransmitBroadcast(len)
            }
            Mode::Renewing => {
                let msg = wire::DhcpMessage {
                    message_type: wire::MSG_REQUEST,
                    xid: self.xid,
                    broadcast: false,
                    ciaddr: identity.ip,
                    client_mac: &self.mac,
                    requested_ip: None,
                    lease_seconds: None,
                    server_id: None,
                    hostname: None,
                };
                let len = wire::send_dhcp_packet(buf, &self.server_mac, &self.server_ip, &identity.ip, &msg);
                self.arm_retry(prng, timers);
                Outcome::TransmitUnicast { mac: self.server_mac, ip: self.server_ip, len }
            }
            Mode::Rebinding => {
                let msg = wire::DhcpMessage {
                    message_type: wire::MSG_REQUEST,
                    xid: self.xid,
                    broadcast: true,
                    ciaddr: identity.ip,
                    client_mac: &self.mac,
                    requested_ip: None,
                    lease_seconds: None,
                    server_id: None,
                    hostname: None,
                };
                let len = wire::send_dhcp_packet(buf, &BROADCAST_MAC, &BROADCAST_IP, &identity.ip, &msg);
                self.arm_retry(prng, timers);
                Outcome::TransmitBroadcast(len)
            }
            _ => Outcome::NoAction,
        }
    }

    /// Operator ran `dhcp on`.
    pub fn enable(&mut self, buf: &mut [u8], prng: &mut NetPrng, timers: &mut TimerService) -> Outcome {
        if self.mode != Mode::Static {
            return Outcome::NoAction;
        }
        self.start_discovery(buf, prng, timers)
    }

    /// Operator ran `dhcp off`: drop straight to STATIC. The caller is
    /// responsible for reloading the identity from the persistent store.
    pub fn disable(&mut self, timers: &mut TimerService) -> Outcome {
        timers.stop_all();
        self.mode = Mode::Static;
        Outcome::NoAction
    }

    /// Operator ran `dhcp refresh`: force a fresh handshake from wherever
    /// we are.
    pub fn refresh(&mut self, buf: &mut [u8], prng: &mut NetPrng, timers: &mut TimerService) -> Outcome {
        self.start_discovery(buf, prng, timers)
    }

    /// Operator ran `dhcp release` (or DHCP is being disabled while bound):
    /// unicast RELEASE, stop every timer, fall back to STATIC.
    pub fn release(&mut self, buf: &mut [u8], identity: &NetworkIdentity, timers: &mut TimerService) -> Outcome {
        let was_active = matches!(self.mode, Mode::Bound | Mode::Renewing | Mode::Rebinding | Mode::AwaitingSafe);
        timers.stop_all();
        self.mode = Mode::Static;
        if !was_active {
            return Outcome::NoAction;
        }
        let msg = wire::DhcpMessage {
            message_type: wire::MSG_RELEASE,
            xid: self.xid,
            broadcast: false,
            ciaddr: identity.ip,
            client_mac: &self.mac,
            requested_ip: None,
            lease_seconds: None,
            server_id: Some(self.server_ip),
            hostname: None,
        };
        let len = wire::send_dhcp_packet(buf, &self.server_mac, &self.server_ip, &identity.ip, &msg);
        Outcome::TransmitUnicast { mac: self.server_mac, ip: self.server_ip, len }
    }

    /// Inbound frame dispatch: only OFFER/ACK/NAK addressed to us, in the
    /// states where each is meaningful, produce an outcome. Anything else
    /// (wrong xid, wrong state, stray broadcast) is ignored in place.
    pub fn handle_frame(
        &mut self,
        buf: &mut [u8],
        identity: &mut NetworkIdentity,
        prng: &mut NetPrng,
        timers: &mut TimerService,
    ) -> Outcome {
        if !ipv4::is_ip(buf) {
            return Outcome::NoAction;
        }
        let options_end = wire::options_end(buf);
        match self.mode {
            Mode::Selecting if wire::is_dhcp_offer(buf, options_end, self.xid, &self.mac) => {
                self.handle_offer(buf, options_end, timers)
            }
            Mode::Requesting | Mode::Renewing | Mode::Rebinding if wire::is_dhcp_ack(buf, options_end, self.xid, &self.mac) => {
                self.handle_ack(buf, options_end, identity, timers)
            }
            Mode::Requesting | Mode::Renewing | Mode::Rebinding if wire::is_dhcp_nak(buf, options_end, self.xid, &self.mac) => {
                self.start_discovery(buf, prng, timers)
            }
            _ => Outcome::NoAction,
        }
    }

    fn handle_offer(&mut self, buf: &mut [u8], options_end: usize, timers: &mut TimerService) -> Outcome {
        self.offered_ip = wire::your_ip(buf);
        self.server_ip = wire::get_option(buf, self.bootp_options(buf), options_end, wire::OPT_SERVER_ID)
            .map(|v| [v[0], v[1], v[2], v[3]])
            .unwrap_or(ZERO_IP);
        self.lease_seconds = wire::get_option(buf, self.bootp_options(buf), options_end, wire::OPT_LEASE_TIME)
            .map(|v| u32::from_be_bytes([v[0], v[1], v[2], v[3]]))
            .unwrap_or(0);

        timers.stop_all();
        self.mode = Mode::Requesting;
        let msg = wire::DhcpMessage {
            message_type: wire::MSG_REQUEST,
            xid: self.xid,
            broadcast: true,
            ciaddr: ZERO_IP,
            client_mac: &self.mac,
            requested_ip: Some(self.offered_ip),
            lease_seconds: Some(self.lease_seconds),
            server_id: Some(self.server_ip),
            hostname: Some(self.hostname()),
        };
        let len = wire::send_dhcp_packet(buf, &BROADCAST_MAC, &BROADCAST_IP, &ZERO_IP, &msg);
        Outcome::TransmitBroadcast(len)
    }

    fn bootp_options(&self, buf: &[u8]) -> usize {
        crate::wire::udp::payload_offset(buf) + wire::OPTIONS
    }

    fn handle_ack(&mut self, buf: &[u8], options_end: usize, identity: &mut NetworkIdentity, timers: &mut TimerService) -> Outcome {
        self.server_mac = crate::wire::ether::src(buf);
        let opts_start = self.bootp_options(buf);
        let mask = wire::get_option(buf, opts_start, options_end, wire::OPT_SUBNET_MASK)
            .map(|v| [v[0], v[1], v[2], v[3]])
            .unwrap_or(identity.mask);
        let gw = wire::get_option(buf, opts_start, options_end, wire::OPT_ROUTER)
            .map(|v| [v[0], v[1], v[2], v[3]])
            .unwrap_or(identity.gw);
        let dns = wire::get_option(buf, opts_start, options_end, wire::OPT_DNS)
            .map(|v| [v[0], v[1], v[2], v[3]])
            .unwrap_or(identity.dns);
        identity.apply_lease(self.offered_ip, mask, gw, dns);

        let was_renewal = matches!(self.mode, Mode::Renewing | Mode::Rebinding);
        timers.stop_all();

        if was_renewal {
            self.arm_lease_timers(timers);
            self.mode = Mode::Bound;
            return Outcome::Bound { lease_seconds: self.lease_seconds };
        }

        self.mode = Mode::AwaitingSafe;
        self.arm_lease_timers(timers);
        timers.arm_one_shot(TimerId::DhcpSafeToUse, SAFE_TO_USE_S);
        Outcome::NoAction
    }

    fn arm_lease_timers(&mut self, timers: &mut TimerService) {
        let t1 = self.lease_seconds / 2;
        let t2 = (self.lease_seconds * 7) / 8;
        timers.arm_one_shot(TimerId::DhcpT1, t1);
        timers.arm_one_shot(TimerId::DhcpT2, t2);
        timers.arm_one_shot(TimerId::DhcpLeaseExpiry, self.lease_seconds);
    }

    /// Build the gratuitous ARP that accompanies a fresh ACK, announcing
    /// collision-checkable ownership of the offered address.
    pub fn build_gratuitous_arp(&self, buf: &mut [u8]) -> usize {
        crate::wire::arp::build_gratuitous(buf, &self.mac, &self.offered_ip)
    }

    /// The 2-second safe-to-use timer fired with no conflicting ARP reply:
    /// promote to BOUND.
    pub fn on_safe_to_use(&mut self) -> Outcome {
        if self.mode == Mode::AwaitingSafe {
            self.mode = Mode::Bound;
            Outcome::Bound { lease_seconds: self.lease_seconds }
        } else {
            Outcome::NoAction
        }
    }

    /// A reply to our gratuitous ARP arrived: somebody else already holds
    /// the offered address. Decline it and restart discovery after a
    /// 10-second hold-off.
    pub fn on_arp_conflict(&mut self, buf: &mut [u8], identity: &NetworkIdentity, timers: &mut TimerService) -> Outcome {
        if !matches!(self.mode, Mode::AwaitingSafe | Mode::Requesting) {
            return Outcome::NoAction;
        }
        timers.stop_all();
        self.mode = Mode::Init;
        let msg = wire::DhcpMessage {
            message_type: wire::MSG_DECLINE,
            xid: self.xid,
            broadcast: true,
            ciaddr: identity.ip,
            client_mac: &self.mac,
            requested_ip: Some(self.offered_ip),
            lease_seconds: None,
            server_id: Some(self.server_ip),
            hostname: None,
        };
        let len = wire::send_dhcp_packet(buf, &BROADCAST_MAC, &BROADCAST_IP, &ZERO_IP, &msg);
        timers.arm_one_shot(TimerId::DhcpDeclineWait, DECLINE_WAIT_S);
        Outcome::TransmitBroadcast(len)
    }

    pub fn on_decline_wait_elapsed(&mut self, buf: &mut [u8], prng: &mut NetPrng, timers: &mut TimerService) -> Outcome {
        if self.mode != Mode::Init {
            return Outcome::NoAction;
        }
        self.start_discovery(buf, prng, timers)
    }

    /// T1 fired while BOUND: move to RENEWING and unicast a REQUEST
    /// directly to the server that granted the lease.
    pub fn on_t1(
        &mut self,
        buf: &mut [u8],
        identity: &NetworkIdentity,
        prng: &mut NetPrng,
        timers: &mut TimerService,
    ) -> Outcome {
        if self.mode != Mode::Bound {
            return Outcome::NoAction;
        }
        self.mode = Mode::Renewing;
        self.retry_count = 0;
        self.arm_retry(prng, timers);
        let msg = wire::DhcpMessage {
            message_type: wire::MSG_REQUEST,
            xid: self.xid,
            broadcast: false,
            ciaddr: identity.ip,
            client_mac: &self.mac,
            requested_ip: None,
            lease_seconds: None,
            server_id: None,
            hostname: None,
        };
        let len = wire::send_dhcp_packet(buf, &self.server_mac, &self.server_ip, &identity.ip, &msg);
        Outcome::TransmitUnicast { mac: self.server_mac, ip: self.server_ip, len }
    }

    /// T2 fired while RENEWING: move to REBINDING and broadcast the
    /// REQUEST instead, since the original server may be unreachable.
    pub fn on_t2(
        &mut self,
        buf: &mut [u8],
        identity: &NetworkIdentity,
        prng: &mut NetPrng,
        timers: &mut TimerService,
    ) -> Outcome {
        if self.mode != Mode::Renewing {
            return Outcome::NoAction;
        }
        self.mode = Mode::Rebinding;
        self.retry_count = 0;
        self.arm_retry(prng, timers);
        let msg = wire::DhcpMessage {
            message_type: wire::MSG_REQUEST,
            xid: self.xid,
            broadcast: true,
            ciaddr: identity.ip,
            client_mac: &self.mac,
            requested_ip: None,
            lease_seconds: None,
            server_id: None,
            hostname: None,
        };
        let len = wire::send_dhcp_packet(buf, &BROADCAST_MAC, &BROADCAST_IP, &identity.ip, &msg);
        Outcome::TransmitBroadcast(len)
    }

    /// The lease expired before REBINDING got an ACK: fall back to INIT
    /// with the live IP zeroed, per the fallback the original exercised.
    pub fn on_lease_expiry(&mut self, identity: &mut NetworkIdentity, timers: &mut TimerService) -> Outcome {
        if self.mode != Mode::Rebinding {
            return Outcome::NoAction;
        }
        timers.stop_all();
        self.mode = Mode::Init;
        identity.clear_lease();
        Outcome::LeaseLost
    }
}
