//! Single-slot TCP mini-handler: passive-open SYN/ACK, PSH|ACK data echo,
//! FIN|ACK teardown. No retransmission, no window management — a peer that
//! drops a packet just times out the slot back to LISTEN on the next SYN.

use crate::wire::tcp as wire;

const ECHO_PAYLOAD: &[u8] = b"Hello";

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum State {
    Listen,
    SynReceived,
    Established,
    FinWait1,
}

#[derive(Copy, Clone)]
pub enum Outcome {
    NoReply,
    Reply(usize),
    /// FIN/ACK teardown answers with two segments in sequence: an ACK,
    /// then our own FIN/ACK, both built into the same buffer by the
    /// caller one after another.
    ReplyThenFin { ack_len: usize },
}

/// One TCP connection slot with a monotonically increasing local sequence
/// counter shared across every segment this handler ever sends.
pub struct TcpHandler {
    state: State,
    current_isn: u32,
}

impl TcpHandler {
    pub const fn new() -> Self {
        TcpHandler { state: State::Listen, current_isn: 0 }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Dispatch one inbound TCP segment already known (via
    /// `crate::wire::classify`) to be addressed to us. Mutates `buf` in
    /// place into whatever reply is warranted.
    pub fn handle_segment(&mut self, buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4]) -> Outcome {
        if wire::is_tcp_finack(buf) {
            return self.handle_finack(buf, our_mac, our_ip);
        }
        if wire::is_tcp_syn(buf) {
            return self.handle_syn(buf, our_mac, our_ip);
        }
        if wire::is_telnet_data(buf) {
            return self.handle_data(buf, our_mac, our_ip);
        }
        if wire::is_tcp_ack(buf) {
            return self.handle_ack(buf);
        }
        Outcome::NoReply
    }

    fn handle_syn(&mut self, buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4]) -> Outcome {
        let isn = self.current_isn;
        self.current_isn = self.current_isn.wrapping_add(1);
        let len = wire::send_tcp_syn_ack(buf, our_mac, our_ip, isn);
        self.state = State::SynReceived;
        Outcome::Reply(len)
    }

    fn handle_ack(&mut self, buf: &[u8]) -> Outcome {
        if self.state == State::SynReceived && wire::ack(buf) == self.current_isn {
            self.state = State::Established;
        }
        Outcome::NoReply
    }

    fn handle_data(&mut self, buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4]) -> Outcome {
        let isn = self.current_isn;
        let len = wire::send_telnet_data(buf, our_mac, our_ip, isn, ECHO_PAYLOAD);
        self.current_isn = self.current_isn.wrapping_add(ECHO_PAYLOAD.len() as u32);
        Outcome::Reply(len)
    }

    fn handle_finack(&mut self, buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4]) -> Outcome {
        let isn = self.current_isn;
        self.current_isn = self.current_isn.wrapping_add(1);
        let ack_len = wire::send_ack_finack(buf, our_mac, our_ip, isn);
        // The caller transmits this ACK, then calls build_second_finack on
        // the same buffer to produce and transmit the closing FIN|ACK.
        self.state = State::FinWait1;
        Outcome::ReplyThenFin { ack_len }
    }

    /// Build the second teardown segment (our own FIN|ACK) into the same
    /// buffer the first reply was built into, reusing its addresses,
    /// ports, and sequence number.
    pub fn build_second_finack(&self, buf: &mut [u8]) -> usize {
        wire::send_finack(buf)
    }
}

impl Default for TcpHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ipv4::*;

    fn segment(flags: u8, seq: u32, payload: &[u8]) -> [u8; 80] {
        let mut buf = [0u8; 80];
        super::super::wire::ether::set_ethertype(&mut buf, super::super::wire::ETHERTYPE_IPV4);
        buf[VER_IHL_OFFSET] = 0x45;
        set_protocol(&mut buf, super::super::wire::IP_PROTO_TCP);
        set_src(&mut buf, &[10, 0, 0, 5]);
        set_dst(&mut buf, &[10, 0, 0, 1]);
        let tcp_off = super::super::wire::ether::PAYLOAD_OFFSET + 20;
        crate::wire::write_u16(&mut buf, tcp_off, 4000);
        crate::wire::write_u16(&mut buf, tcp_off + 2, 23);
        crate::wire::write_u32(&mut buf, tcp_off + 4, seq);
        buf[tcp_off + 12] = 5 << 4;
        buf[tcp_off + 13] = flags;
        let seg_len = 20 + payload.len();
        buf[tcp_off + 20..tcp_off + 20 + payload.len()].copy_from_slice(payload);
        set_total_len(&mut buf, (20 + seg_len) as u16);
        fill_checksum(&mut buf);
        buf
    }

    #[test]
    fn syn_then_ack_reaches_established() {
        let mut h = TcpHandler::new();
        let mut syn = segment(wire::FLAG_SYN, 0x1000, &[]);
        match h.handle_segment(&mut syn, &[1; 6], &[10, 0, 0, 1]) {
            Outcome::Reply(_) => {}
            _ => panic!("expected SYN/ACK reply"),
        }
        assert_eq!(h.state(), State::SynReceived);
        assert_eq!(wire::seq(&syn), 0);
        assert_eq!(wire::ack(&syn), 0x1001);

        let ack = segment(wire::FLAG_ACK, 0x1001, &[]);
        let mut ack = ack;
        crate::wire::write_u32(&mut ack, super::super::wire::ether::PAYLOAD_OFFSET + 20 + 8, 1);
        fill_checksum(&mut ack);
        h.handle_segment(&mut ack, &[1; 6], &[10, 0, 0, 1]);
        assert_eq!(h.state(), State::Established);
    }

    #[test]
    fn telnet_data_replies_with_fixed_payload_and_advances_isn() {
        let mut h = TcpHandler::new();
        let mut data = segment(wire::FLAG_PSH | wire::FLAG_ACK, 0x2000, b"q");
        h.handle_segment(&mut data, &[1; 6], &[10, 0, 0, 1]);
        let po = wire::payload_offset(&data);
        assert_eq!(&data[po..po + 5], b"Hello");
        assert_eq!(h.current_isn, 5);
        // "q" is one byte; the ack must cover only what the peer actually
        // sent, not the five bytes of our fixed reply.
        assert_eq!(wire::ack(&data), 0x2001);
    }

    #[test]
    fn finack_transitions_to_finwait1_and_needs_second_segment() {
        let mut h = TcpHandler::new();
        let mut fin = segment(wire::FLAG_FIN | wire::FLAG_ACK, 0x3000, &[]);
        let outcome = h.handle_segment(&mut fin, &[1; 6], &[10, 0, 0, 1]);
        assert!(matches!(outcome, Outcome::ReplyThenFin { .. }));
        assert_eq!(h.state(), State::FinWait1);
        let mut second = fin;
        let len = h.build_second_finack(&mut second);
        assert!(len > 0);
        assert_eq!(wire::flags(&second), wire::FLAG_FIN | wire::FLAG_ACK);
    }
}
