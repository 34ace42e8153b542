//! TCP header accessors (RFC 793) for the single-connection echo slot.
//!
//! Only the handshake and teardown flags the mini-handler needs are
//! exposed; sequencing and retransmission live in `crate::tcp`.

use super::ipv4::{header_len, total_len};

pub const FLAG_FIN: u8 = 0x01;
pub const FLAG_SYN: u8 = 0x02;
pub const FLAG_RST: u8 = 0x04;
pub const FLAG_PSH: u8 = 0x08;
pub const FLAG_ACK: u8 = 0x10;
pub const FLAG_URG: u8 = 0x20;

fn tcp_offset(buf: &[u8]) -> usize {
    super::ether::PAYLOAD_OFFSET + header_len(buf)
}

pub fn src_port(buf: &[u8]) -> u16 {
    super::read_u16(buf, tcp_offset(buf))
}

pub fn dst_port(buf: &[u8]) -> u16 {
    super::read_u16(buf, tcp_offset(buf) + 2)
}

pub fn seq(buf: &[u8]) -> u32 {
    super::read_u32(buf, tcp_offset(buf) + 4)
}

pub fn set_seq(buf: &mut [u8], value: u32) {
    super::write_u32(buf, tcp_offset(buf) + 4, value)
}

pub fn ack(buf: &[u8]) -> u32 {
    super::read_u32(buf, tcp_offset(buf) + 8)
}

pub fn set_ack(buf: &mut [u8], value: u32) {
    super::write_u32(buf, tcp_offset(buf) + 8, value)
}

/// Data offset in bytes (top nibble of the 13th TCP octet, in 32-bit words).
pub fn data_offset(buf: &[u8]) -> usize {
    ((buf[tcp_offset(buf) + 12] >> 4) as usize) * 4
}

pub fn set_data_offset_words(buf: &mut [u8], words: u8) {
    let off = tcp_offset(buf) + 12;
    buf[off] = words << 4;
}

/// Flag octet. The original C port read this out of the wrong byte of the
/// 16-bit `hlen_flags` word when checking FIN/ACK together; here flags live
/// in their own accessor so every caller sees the same (correct) byte.
pub fn flags(buf: &[u8]) -> u8 {
    buf[tcp_offset(buf) + 13]
}

pub fn set_flags(buf: &mut [u8], flags: u8) {
    buf[tcp_offset(buf) + 13] = flags;
}

pub fn window(buf: &[u8]) -> u16 {
    super::read_u16(buf, tcp_offset(buf) + 14)
}

pub fn set_window(buf: &mut [u8], value: u16) {
    super::write_u16(buf, tcp_offset(buf) + 14, value)
}

pub fn payload_offset(buf: &[u8]) -> usize {
    tcp_offset(buf) + data_offset(buf)
}

pub fn payload_len(buf: &[u8]) -> usize {
    let total = total_len(buf) as usize;
    let ip_hlen = header_len(buf);
    let seg_len = total.saturating_sub(ip_hlen);
    seg_len.saturating_sub(data_offset(buf))
}

pub fn is_tcp(buf: &[u8]) -> bool {
    super::ipv4::is_ip(buf) && super::ipv4::protocol(buf) == super::IP_PROTO_TCP
}

pub fn is_tcp_syn(buf: &[u8]) -> bool {
    is_tcp(buf) && flags(buf) & (FLAG_SYN | FLAG_ACK) == FLAG_SYN
}

pub fn is_tcp_ack(buf: &[u8]) -> bool {
    is_tcp(buf) && flags(buf) & FLAG_ACK != 0
}

/// FIN+ACK together. The original compared the FIN bit from one byte of the
/// (host-order-swapped) header word against the ACK bit from the other,
/// which meant a standalone ACK with PSH set could be mistaken for a
/// teardown; here both bits are read from the single real flag byte.
pub fn is_tcp_finack(buf: &[u8]) -> bool {
    is_tcp(buf) && flags(buf) & (FLAG_FIN | FLAG_ACK) == (FLAG_FIN | FLAG_ACK)
}

pub fn is_telnet_data(buf: &[u8]) -> bool {
    is_tcp(buf) && flags(buf) & FLAG_PSH != 0 && payload_len(buf) > 0
}

fn fill_tcp_checksum(buf: &mut [u8]) {
    let ip_src = super::ipv4::src(buf);
    let ip_dst = super::ipv4::dst(buf);
    let ip_hlen = header_len(buf);
    let off = tcp_offset(buf);
    let seg_len = (total_len(buf) as usize).saturating_sub(ip_hlen);
    super::write_u16(buf, off + 16, 0);
    let csum = super::pseudo_header_checksum(
        &ip_src,
        &ip_dst,
        super::IP_PROTO_TCP,
        seg_len as u16,
        &buf[off..off + seg_len],
    );
    super::write_u16(buf, off + 16, csum);
}

fn turnaround_to(buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4]) {
    let peer_mac = super::ether::src(buf);
    let peer_ip = super::ipv4::src(buf);
    super::ether::set_dst(buf, &peer_mac);
    super::ether::set_src(buf, our_mac);
    super::ipv4::set_src(buf, our_ip);
    super::ipv4::set_dst(buf, &peer_ip);
    let sp = src_port(buf);
    let dp = dst_port(buf);
    let off = tcp_offset(buf);
    super::write_u16(buf, off, dp);
    super::write_u16(buf, off + 2, sp);
}

/// Turn an inbound SYN into a SYN/ACK: swap addresses and ports, ack the
/// peer's ISN, stamp `our_isn` as our own sequence number. Returns the
/// frame length (20-byte TCP header, no options, no data).
pub fn send_tcp_syn_ack(buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4], our_isn: u32) -> usize {
    let peer_isn = seq(buf);
    turnaround_to(buf, our_mac, our_ip);
    set_seq(buf, our_isn);
    set_ack(buf, peer_isn.wrapping_add(1));
    set_data_offset_words(buf, 5);
    set_flags(buf, FLAG_SYN | FLAG_ACK);
    set_window(buf, 0x2000);

    let ip_hlen = header_len(buf);
    super::ipv4::set_total_len(buf, (ip_hlen + 20) as u16);
    fill_tcp_checksum(buf);
    super::ipv4::fill_checksum(buf);

    super::ether::PAYLOAD_OFFSET + ip_hlen + 20
}

/// Echo telnet data back with PSH/ACK set, advancing our sequence number
/// past the bytes of `reply` we send and acking past the bytes the peer
/// actually sent — the two lengths are independent since `reply` is a
/// fixed payload, not an echo of the inbound segment.
pub fn send_telnet_data(buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4], our_seq: u32, reply: &[u8]) -> usize {
    let peer_seq = seq(buf);
    let received_len = payload_len(buf) as u32;

    turnaround_to(buf, our_mac, our_ip);
    set_seq(buf, our_seq);
    set_ack(buf, peer_seq.wrapping_add(received_len));
    set_data_offset_words(buf, 5);
    set_flags(buf, FLAG_PSH | FLAG_ACK);

    let reply_start = super::ether::PAYLOAD_OFFSET + header_len(buf) + 20;
    let reply_end = reply_start + reply.len();
    if reply_end <= buf.len() {
        buf[reply_start..reply_end].copy_from_slice(reply);
    }

    let ip_hlen = header_len(buf);
    super::ipv4::set_total_len(buf, (ip_hlen + 20 + reply.len()) as u16);
    fill_tcp_checksum(buf);
    super::ipv4::fill_checksum(buf);

    super::ether::PAYLOAD_OFFSET + ip_hlen + 20 + reply.len()
}

/// Ack an inbound FIN/ACK: the first of the two-segment teardown reply,
/// FIN left clear. Call [`send_finack`] on the same buffer afterward to
/// produce the second segment.
pub fn send_ack_finack(buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4], our_seq: u32) -> usize {
    let peer_seq = seq(buf);
    turnaround_to(buf, our_mac, our_ip);
    set_seq(buf, our_seq);
    set_ack(buf, peer_seq.wrapping_add(1));
    set_data_offset_words(buf, 5);
    set_flags(buf, FLAG_ACK);

    let ip_hlen = header_len(buf);
    super::ipv4::set_total_len(buf, (ip_hlen + 20) as u16);
    fill_tcp_checksum(buf);
    super::ipv4::fill_checksum(buf);

    super::ether::PAYLOAD_OFFSET + ip_hlen + 20
}

/// The second teardown segment: set FIN alongside the ACK already present
/// from [`send_ack_finack`] and recompute checksums. Addresses, ports, and
/// sequence numbers are left exactly as the first segment set them.
pub fn send_finack(buf: &mut [u8]) -> usize {
    let current = flags(buf);
    set_flags(buf, current | FLAG_FIN);
    fill_tcp_checksum(buf);
    super::ipv4::fill_checksum(buf);
    super::ether::PAYLOAD_OFFSET + header_len(buf) + 20
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ipv4::*;

    fn segment(flags_byte: u8, payload: &[u8]) -> [u8; 80] {
        let mut buf = [0u8; 80];
        super::super::ether::set_ethertype(&mut buf, super::super::ETHERTYPE_IPV4);
        buf[VER_IHL_OFFSET] = 0x45;
        set_protocol(&mut buf, super::super::IP_PROTO_TCP);
        set_src(&mut buf, &[10, 0, 0, 5]);
        set_dst(&mut buf, &[10, 0, 0, 1]);
        let tcp_off = super::super::ether::PAYLOAD_OFFSET + 20;
        super::super::write_u16(&mut buf, tcp_off, 4000);
        super::super::write_u16(&mut buf, tcp_off + 2, 23);
        super::super::write_u32(&mut buf, tcp_off + 4, 1000);
        buf[tcp_off + 12] = 5 << 4;
        buf[tcp_off + 13] = flags_byte;
        let seg_len = 20 + payload.len();
        buf[tcp_off + 20..tcp_off + 20 + payload.len()].copy_from_slice(payload);
        set_total_len(&mut buf, (20 + seg_len) as u16);
        fill_checksum(&mut buf);
        buf
    }

    #[test]
    fn syn_without_ack_is_classified_as_syn() {
        let buf = segment(FLAG_SYN, &[]);
        assert!(is_tcp_syn(&buf));
        assert!(!is_tcp_finack(&buf));
    }

    #[test]
    fn fin_ack_requires_both_bits_in_the_real_flag_byte() {
        let only_ack = segment(FLAG_ACK | FLAG_PSH, b"hi");
        assert!(!is_tcp_finack(&only_ack));
        let finack = segment(FLAG_FIN | FLAG_ACK, &[]);
        assert!(is_tcp_finack(&finack));
    }

    #[test]
    fn syn_ack_reply_acks_peer_isn() {
        let mut buf = segment(FLAG_SYN, &[]);
        send_tcp_syn_ack(&mut buf, &[1; 6], &[10, 0, 0, 1], 500);
        assert_eq!(seq(&buf), 500);
        assert_eq!(ack(&buf), 1001);
        assert_eq!(flags(&buf), FLAG_SYN | FLAG_ACK);
        assert!(checksum_valid(&buf));
    }

    #[test]
    fn telnet_echo_acks_received_bytes_not_reply_bytes() {
        let mut buf = segment(FLAG_PSH | FLAG_ACK, b"hi");
        assert!(is_telnet_data(&buf));
        send_telnet_data(&mut buf, &[1; 6], &[10, 0, 0, 1], 9000, b"Hello");
        // peer sent 2 bytes ("hi"); the ack must cover those two bytes even
        // though our fixed reply is five bytes long.
        assert_eq!(ack(&buf), 1002);
        let po = payload_offset(&buf);
        assert_eq!(&buf[po..po + 5], b"Hello");
    }
}
