#![no_std]
#![forbid(unsafe_code)]
//! A `#![no_std]` embedded TCP/IP core: ARP, IPv4, ICMP Echo, UDP, a
//! trivial TCP/Telnet echo service, a DHCP client, and the persistent
//! config-slot store behind it all. Talks to the outside world only
//! through the [`platform::Platform`] boundary — every register, UART,
//! and flash access is the concrete board crate's job, not this one's.

pub mod checksum;
pub mod config;
pub mod console;
pub mod dhcp;
pub mod mac_phy;
pub mod platform;
pub mod prng;
pub mod state;
pub mod tcp;
pub mod timers;
pub mod wire;

pub use config::NetworkIdentity;
pub use platform::Platform;
pub use state::{BoardConfig, NetCore};
