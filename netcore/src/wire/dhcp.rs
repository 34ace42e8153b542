//! BOOTP/DHCP (RFC 2131) wire layout: header accessors, option scan/emit,
//! and the OFFER/ACK classify predicates.
//!
//! This module only understands bytes on the wire. The retry/backoff state
//! machine that decides when to call into it lives in `crate::dhcp`.

use super::udp::payload_offset as udp_payload_offset;
use super::{read_ipv4, read_mac, read_u32, write_ipv4, write_mac, write_u16, write_u32};

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = 6;
pub const MAGIC_COOKIE: u32 = 0x6382_5363;
pub const FLAG_BROADCAST: u16 = 0x8000;

pub const CLIENT_PORT: u16 = 68;
pub const SERVER_PORT: u16 = 67;

pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS: u8 = 6;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_PARAM_REQUEST_LIST: u8 = 55;
pub const OPT_CLIENT_ID: u8 = 61;
pub const OPT_HOSTNAME: u8 = 12;
pub const OPT_END: u8 = 0xFF;

pub const MSG_DISCOVER: u8 = 1;
pub const MSG_OFFER: u8 = 2;
pub const MSG_REQUEST: u8 = 3;
pub const MSG_DECLINE: u8 = 4;
pub const MSG_ACK: u8 = 5;
pub const MSG_NAK: u8 = 6;
pub const MSG_RELEASE: u8 = 7;

const OP: usize = 0;
const HTYPE: usize = 1;
const HLEN: usize = 2;
const XID: usize = 4;
const FLAGS: usize = 10;
const CIADDR: usize = 12;
const YIADDR: usize = 16;
const GIADDR: usize = 24;
const CHADDR: usize = 28;
const MAGIC: usize = 236;
pub const OPTIONS: usize = 240;
pub const FIXED_LEN: usize = OPTIONS;

fn bootp(buf: &[u8]) -> usize {
    udp_payload_offset(buf)
}

pub fn xid(buf: &[u8]) -> u32 {
    read_u32(buf, bootp(buf) + XID)
}

pub fn your_ip(buf: &[u8]) -> [u8; 4] {
    read_ipv4(buf, bootp(buf) + YIADDR)
}

pub fn client_hw_addr(buf: &[u8]) -> [u8; 6] {
    read_mac(buf, bootp(buf) + CHADDR)
}

/// Scan a DHCP options region for `tag`, returning its value bytes.
pub fn get_option<'a>(buf: &'a [u8], options_start: usize, options_end: usize, tag: u8) -> Option<&'a [u8]> {
    let mut cursor = options_start;
    while cursor < options_end {
        let t = buf[cursor];
        if t == OPT_END {
            break;
        }
        if cursor + 1 >= options_end {
            break;
        }
        let len = buf[cursor + 1] as usize;
        let value_start = cursor + 2;
        let value_end = value_start + len;
        if value_end > options_end {
            break;
        }
        if t == tag {
            return Some(&buf[value_start..value_end]);
        }
        cursor = value_end;
    }
    None
}

/// Write a single `[tag][len][values...]` option, returning the cursor
/// advanced past it.
pub fn put_option(buf: &mut [u8], cursor: usize, tag: u8, values: &[u8]) -> usize {
    buf[cursor] = tag;
    buf[cursor + 1] = values.len() as u8;
    buf[cursor + 2..cursor + 2 + values.len()].copy_from_slice(values);
    cursor + 2 + values.len()
}

pub fn message_type(buf: &[u8], options_end: usize) -> Option<u8> {
    get_option(buf, bootp(buf) + OPTIONS, options_end, OPT_MESSAGE_TYPE).and_then(|v| v.first().copied())
}

/// An inbound OFFER addressed to us. Unlike the original, every octet of
/// the client hardware address is compared — a loop that resets its
/// accumulator each iteration would let only the last octet decide.
pub fn is_dhcp_offer(buf: &[u8], options_end: usize, want_xid: u32, our_mac: &[u8; 6]) -> bool {
    super::udp::is_udp(buf)
        && super::udp::dst_port(buf) == CLIENT_PORT
        && buf[bootp(buf) + OP] == BOOTREPLY
        && xid(buf) == want_xid
        && client_hw_addr(buf) == *our_mac
        && message_type(buf, options_end) == Some(MSG_OFFER)
}

pub fn is_dhcp_ack(buf: &[u8], options_end: usize, want_xid: u32, our_mac: &[u8; 6]) -> bool {
    super::udp::is_udp(buf)
        && super::udp::dst_port(buf) == CLIENT_PORT
        && buf[bootp(buf) + OP] == BOOTREPLY
        && xid(buf) == want_xid
        && client_hw_addr(buf) == *our_mac
        && message_type(buf, options_end) == Some(MSG_ACK)
}

pub fn is_dhcp_nak(buf: &[u8], options_end: usize, want_xid: u32, our_mac: &[u8; 6]) -> bool {
    super::udp::is_udp(buf)
        && super::udp::dst_port(buf) == CLIENT_PORT
        && buf[bootp(buf) + OP] == BOOTREPLY
        && xid(buf) == want_xid
        && client_hw_addr(buf) == *our_mac
        && message_type(buf, options_end) == Some(MSG_NAK)
}

/// Everything a DHCP client-side message needs to fill in the BOOTP header
/// and option set. `ciaddr` is non-zero only for RENEW/REBIND/RELEASE.
pub struct DhcpMessage<'a> {
    pub message_type: u8,
    pub xid: u32,
    pub broadcast: bool,
    pub ciaddr: [u8; 4],
    pub client_mac: &'a [u8; 6],
    pub requested_ip: Option<[u8; 4]>,
    pub lease_seconds: Option<u32>,
    pub server_id: Option<[u8; 4]>,
    pub hostname: Option<&'a [u8]>,
}

/// Build a full Ethernet/IPv4/UDP/BOOTP client message in place. The
/// caller selects broadcast (dst ff:ff:ff:ff:ff:ff, 255.255.255.255) or
/// unicast (dst = learned server MAC/IP) addressing before calling, by way
/// of `dst_mac`/`dst_ip`/`src_ip`. Returns the frame length.
pub fn send_dhcp_packet(
    buf: &mut [u8],
    dst_mac: &[u8; 6],
    dst_ip: &[u8; 4],
    src_ip: &[u8; 4],
    msg: &DhcpMessage,
) -> usize {
    super::ether::set_dst(buf, dst_mac);
    super::ether::set_src(buf, msg.client_mac);
    super::ether::set_ethertype(buf, super::ETHERTYPE_IPV4);

    buf[super::ipv4::VER_IHL_OFFSET] = 0x45;
    super::ipv4::set_ttl(buf, 64);
    super::ipv4::set_protocol(buf, super::IP_PROTO_UDP);
    super::ipv4::set_src(buf, src_ip);
    super::ipv4::set_dst(buf, dst_ip);

    let udp_off = super::ether::PAYLOAD_OFFSET + 20;
    write_u16(buf, udp_off, CLIENT_PORT);
    write_u16(buf, udp_off + 2, SERVER_PORT);

    let bootp_off = udp_off + 8;
    buf[bootp_off + OP] = BOOTREQUEST;
    buf[bootp_off + HTYPE] = HTYPE_ETHERNET;
    buf[bootp_off + HLEN] = HLEN_ETHERNET;
    write_u32(buf, bootp_off + XID, msg.xid);
    write_u16(buf, bootp_off + FLAGS, if msg.broadcast { FLAG_BROADCAST } else { 0 });
    write_ipv4(buf, bootp_off + CIADDR, &msg.ciaddr);
    write_ipv4(buf, bootp_off + YIADDR, &[0u8; 4]);
    write_ipv4(buf, bootp_off + GIADDR, &[0u8; 4]);
    write_mac(buf, bootp_off + CHADDR, msg.client_mac);
    write_u32(buf, bootp_off + MAGIC, MAGIC_COOKIE);

    let mut cursor = bootp_off + OPTIONS;
    cursor = put_option(buf, cursor, OPT_MESSAGE_TYPE, &[msg.message_type]);
    if let Some(ip) = msg.requested_ip {
        cursor = put_option(buf, cursor, OPT_REQUESTED_IP, &ip);
    }
    if let Some(lease) = msg.lease_seconds {
        cursor = put_option(buf, cursor, OPT_LEASE_TIME, &lease.to_be_bytes());
    }
    if let Some(server) = msg.server_id {
        cursor = put_option(buf, cursor, OPT_SERVER_ID, &server);
    }
    // Every outgoing packet carries 55 and 61, not just DISCOVER/REQUEST —
    // DECLINE and RELEASE need them too.
    cursor = put_option(
        buf,
        cursor,
        OPT_PARAM_REQUEST_LIST,
        &[OPT_SUBNET_MASK, 2, OPT_ROUTER, OPT_DNS, OPT_LEASE_TIME],
    );
    let mut client_id = [0u8; 7];
    client_id[0] = 1;
    client_id[1..].copy_from_slice(msg.client_mac);
    cursor = put_option(buf, cursor, OPT_CLIENT_ID, &client_id);
    if let Some(hostname) = msg.hostname {
        cursor = put_option(buf, cursor, OPT_HOSTNAME, hostname);
    }
    buf[cursor] = OPT_END;
    cursor += 1;

    let bootp_len = cursor - bootp_off;
    let udp_len = 8 + bootp_len;
    write_u16(buf, udp_off + 4, udp_len as u16);
    super::ipv4::set_total_len(buf, (20 + udp_len) as u16);

    super::write_u16(buf, udp_off + 6, 0);
    let csum = super::pseudo_header_checksum(
        src_ip,
        dst_ip,
        super::IP_PROTO_UDP,
        udp_len as u16,
        &buf[udp_off..udp_off + udp_len],
    );
    super::write_u16(buf, udp_off + 6, if csum == 0 { 0xFFFF } else { csum });
    super::ipv4::fill_checksum(buf);

    super::ether::PAYLOAD_OFFSET + 20 + udp_len
}

/// Options region parsed from a received packet, sized from the UDP
/// datagram length rather than the full buffer, so trailing garbage past
/// the datagram never confuses the scan.
pub fn options_end(buf: &[u8]) -> usize {
    bootp(buf) + super::udp::length(buf) as usize - 8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_mac() -> [u8; 6] {
        [0x02, 0x03, 0x04, 0x05, 0x06, 0x88]
    }

    #[test]
    fn discover_round_trips_through_option_scan() {
        let mut buf = [0u8; 400];
        let msg = DhcpMessage {
            message_type: MSG_DISCOVER,
            xid: 0xCAFEBABE,
            broadcast: true,
            ciaddr: [0, 0, 0, 0],
            client_mac: &client_mac(),
            requested_ip: None,
            lease_seconds: None,
            server_id: None,
            hostname: None,
        };
        let len = send_dhcp_packet(&mut buf, &[0xFF; 6], &[255, 255, 255, 255], &[0, 0, 0, 0], &msg);
        assert!(len > FIXED_LEN);
        assert_eq!(xid(&buf), 0xCAFEBABE);
        let oend = options_end(&buf);
        assert_eq!(message_type(&buf, oend), Some(MSG_DISCOVER));
        let cid = get_option(&buf, bootp(&buf) + OPTIONS, oend, OPT_CLIENT_ID).unwrap();
        assert_eq!(cid[0], 1);
        assert_eq!(&cid[1..], &client_mac());
    }

    #[test]
    fn request_carries_requested_ip_and_server_id() {
        let mut buf = [0u8; 400];
        let msg = DhcpMessage {
            message_type: MSG_REQUEST,
            xid: 7,
            broadcast: true,
            ciaddr: [0, 0, 0, 0],
            client_mac: &client_mac(),
            requested_ip: Some([10, 0, 0, 42]),
            lease_seconds: Some(600),
            server_id: Some([10, 0, 0, 1]),
            hostname: None,
        };
        send_dhcp_packet(&mut buf, &[0xFF; 6], &[255, 255, 255, 255], &[0, 0, 0, 0], &msg);
        let oend = options_end(&buf);
        let req_ip = get_option(&buf, bootp(&buf) + OPTIONS, oend, OPT_REQUESTED_IP).unwrap();
        assert_eq!(req_ip, [10, 0, 0, 42]);
        let server = get_option(&buf, bootp(&buf) + OPTIONS, oend, OPT_SERVER_ID).unwrap();
        assert_eq!(server, [10, 0, 0, 1]);
    }

    #[test]
    fn mac_compare_requires_every_octet_to_match() {
        let mut buf = [0u8; 400];
        let msg = DhcpMessage {
            message_type: MSG_OFFER,
            xid: 99,
            broadcast: false,
            ciaddr: [0, 0, 0, 0],
            client_mac: &client_mac(),
            requested_ip: None,
            lease_seconds: None,
            server_id: None,
            hostname: None,
        };
        let _ = send_dhcp_packet(&mut buf, &[0xFF; 6], &[255, 255, 255, 255], &[0, 0, 0, 0], &msg);
        buf[bootp(&buf) + OP] = BOOTREPLY;
        let oend = options_end(&buf);

        let mut wrong_mac = client_mac();
        wrong_mac[5] ^= 0xFF;
        assert!(!is_dhcp_offer(&buf, oend, 99, &wrong_mac));
        assert!(is_dhcp_offer(&buf, oend, 99, &client_mac()));
    }

    #[test]
    fn param_request_list_matches_spec_order() {
        let mut buf = [0u8; 400];
        let msg = DhcpMessage {
            message_type: MSG_DISCOVER,
            xid: 1,
            broadcast: true,
            ciaddr: [0, 0, 0, 0],
            client_mac: &client_mac(),
            requested_ip: None,
            lease_seconds: None,
            server_id: None,
            hostname: None,
        };
        send_dhcp_packet(&mut buf, &[0xFF; 6], &[255, 255, 255, 255], &[0, 0, 0, 0], &msg);
        let oend = options_end(&buf);
        let list = get_option(&buf, bootp(&buf) + OPTIONS, oend, OPT_PARAM_REQUEST_LIST).unwrap();
        assert_eq!(list, &[1, 2, 3, 6, 51]);
    }

    #[test]
    fn decline_and_release_still_carry_param_list_and_client_id() {
        for message_type in [MSG_DECLINE, MSG_RELEASE] {
            let mut buf = [0u8; 400];
            let msg = DhcpMessage {
                message_type,
                xid: 1,
                broadcast: false,
                ciaddr: [10, 0, 0, 42],
                client_mac: &client_mac(),
                requested_ip: None,
                lease_seconds: None,
                server_id: None,
                hostname: None,
            };
            send_dhcp_packet(&mut buf, &[0xAA; 6], &[10, 0, 0, 1], &[10, 0, 0, 42], &msg);
            let oend = options_end(&buf);
            assert!(
                get_option(&buf, bootp(&buf) + OPTIONS, oend, OPT_PARAM_REQUEST_LIST).is_some(),
                "message type {} missing option 55",
                message_type
            );
            let cid = get_option(&buf, bootp(&buf) + OPTIONS, oend, OPT_CLIENT_ID).unwrap();
            assert_eq!(cid[0], 1);
            assert_eq!(&cid[1..], &client_mac());
        }
    }

    #[test]
    fn unrequested_option_scan_returns_none() {
        let mut buf = [0u8; 400];
        let msg = DhcpMessage {
            message_type: MSG_DISCOVER,
            xid: 1,
            broadcast: true,
            ciaddr: [0, 0, 0, 0],
            client_mac: &client_mac(),
            requested_ip: None,
            lease_seconds: None,
            server_id: None,
            hostname: None,
        };
        send_dhcp_packet(&mut buf, &[0xFF; 6], &[255, 255, 255, 255], &[0, 0, 0, 0], &msg);
        let oend = options_end(&buf);
        assert!(get_option(&buf, bootp(&buf) + OPTIONS, oend, OPT_SERVER_ID).is_none());
    }
}
