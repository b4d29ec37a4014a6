//! Packet buffers, Ethernet framing and the smoltcp glue

pub mod ethernet;
pub mod skbuff;
pub mod stack;

// Re-export commonly used types
pub use ethernet::{ETHERTYPE_ARP, ETHERTYPE_IPV4, MacAddress};
pub use skbuff::{ChecksumState, SkBuff};
