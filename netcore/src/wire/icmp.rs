//! ICMP Echo (RFC 792). Only the echo request/reply pair is implemented;
//! other ICMP types are classified but otherwise dropped.

use super::ipv4::{header_len, total_len, PROTOCOL_OFFSET};
use crate::checksum::ChecksumAccumulator;

pub const TYPE_ECHO_REPLY: u8 = 0;
pub const TYPE_ECHO_REQUEST: u8 = 8;

fn icmp_offset(buf: &[u8]) -> usize {
    super::ether::PAYLOAD_OFFSET + header_len(buf)
}

pub fn icmp_type(buf: &[u8]) -> u8 {
    buf[icmp_offset(buf)]
}

fn set_type(buf: &mut [u8], t: u8) {
    let off = icmp_offset(buf);
    buf[off] = t;
}

fn checksum_offset(buf: &[u8]) -> usize {
    icmp_offset(buf) + 2
}

/// Frame is a well-formed IPv4 ICMP echo request.
pub fn is_ping_request(buf: &[u8]) -> bool {
    super::ipv4::is_ip(buf) && buf[PROTOCOL_OFFSET] == super::IP_PROTO_ICMP && {
        let off = icmp_offset(buf);
        buf.len() > off && buf[off] == TYPE_ECHO_REQUEST
    }
}

/// Turn an inbound echo request into an echo reply in place: flip the type,
/// swap the IP addresses, and recompute both checksums. Returns the frame
/// length (unchanged, since the ICMP payload is echoed verbatim).
pub fn send_ping_response(buf: &mut [u8], our_mac: &[u8; 6], our_ip: &[u8; 4]) -> usize {
    let requester_mac = super::ether::src(buf);
    let requester_ip = super::ipv4::src(buf);
    let total = total_len(buf) as usize;

    super::ether::set_dst(buf, &requester_mac);
    super::ether::set_src(buf, our_mac);
    super::ipv4::set_src(buf, our_ip);
    super::ipv4::set_dst(buf, &requester_ip);

    set_type(buf, TYPE_ECHO_REPLY);

    let icmp_start = icmp_offset(buf);
    let icmp_len = total - header_len(buf);
    let csum_off = checksum_offset(buf);
    buf[csum_off] = 0;
    buf[csum_off + 1] = 0;
    let mut acc = ChecksumAccumulator::new();
    acc.sum_words(&buf[icmp_start..icmp_start + icmp_len]);
    super::write_u16(buf, csum_off, acc.fold());

    super::ipv4::fill_checksum(buf);

    super::ether::PAYLOAD_OFFSET + header_len(buf) + icmp_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ipv4::*;

    fn echo_request() -> [u8; 42] {
        let mut buf = [0u8; 42];
        super::super::ether::set_ethertype(&mut buf, super::super::ETHERTYPE_IPV4);
        buf[VER_IHL_OFFSET] = 0x45;
        set_total_len(&mut buf, 28);
        set_protocol(&mut buf, super::super::IP_PROTO_ICMP);
        set_src(&mut buf, &[10, 0, 0, 5]);
        set_dst(&mut buf, &[10, 0, 0, 1]);
        fill_checksum(&mut buf);
        let icmp_off = super::super::ether::PAYLOAD_OFFSET + 20;
        buf[icmp_off] = TYPE_ECHO_REQUEST;
        buf[icmp_off + 4] = 0xAB;
        buf[icmp_off + 5] = 0xCD;
        buf
    }

    #[test]
    fn recognizes_echo_request() {
        assert!(is_ping_request(&echo_request()));
    }

    #[test]
    fn reply_flips_type_and_addresses() {
        let mut buf = echo_request();
        send_ping_response(&mut buf, &[1; 6], &[10, 0, 0, 1]);
        assert_eq!(icmp_type(&buf), TYPE_ECHO_REPLY);
        assert_eq!(src(&buf), [10, 0, 0, 1]);
        assert_eq!(dst(&buf), [10, 0, 0, 5]);
        assert!(checksum_valid(&buf));
    }

    #[test]
    fn reply_preserves_identifier_and_sequence() {
        let mut buf = echo_request();
        send_ping_response(&mut buf, &[1; 6], &[10, 0, 0, 1]);
        let icmp_off = super::super::ether::PAYLOAD_OFFSET + 20;
        assert_eq!(buf[icmp_off + 4], 0xAB);
        assert_eq!(buf[icmp_off + 5], 0xCD);
    }
}
