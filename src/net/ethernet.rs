//! Ethernet framing helpers
//!
//! MAC address representation, the header lengths the MAC cores care about
//! and the CRC used by the multicast hash filters.

use core::fmt;
use core::str::FromStr;

/// Ethernet header size: dest MAC (6) + src MAC (6) + ethertype (2)
pub const ETH_HLEN: usize = 14;

/// Frame check sequence appended by the MAC and reported in the RX length
pub const ETH_FCS_LEN: usize = 4;

/// 802.1Q tag
pub const VLAN_HLEN: usize = 4;

/// Minimum frame size without FCS
pub const ETH_ZLEN: usize = 60;

/// Standard MTU
pub const ETH_DATA_LEN: usize = 1500;

/// Smallest MTU accepted by `change_mtu`
pub const ETH_MIN_MTU: usize = 46;

/// Values below this in the type/length field are 802.3 lengths
pub const ETH_P_802_3_MIN: u16 = 0x0600;

// EtherType constants
// Source: IEEE 802 Numbers
// <https://www.iana.org/assignments/ieee-802-numbers/ieee-802-numbers.xhtml>

/// IPv4 protocol
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// ARP (Address Resolution Protocol)
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// IPv6 protocol
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

/// 48-bit MAC (Media Access Control) address
///
/// Format: 6 bytes, displayed as XX:XX:XX:XX:XX:XX in hexadecimal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Create a new MAC address from 6 bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Broadcast MAC address (FF:FF:FF:FF:FF:FF)
    pub const fn broadcast() -> Self {
        Self([0xFF; 6])
    }

    /// Zero MAC address (00:00:00:00:00:00)
    pub const fn zero() -> Self {
        Self([0x00; 6])
    }

    /// Check if this is a broadcast address
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 6]
    }

    /// Check if this is a multicast address (bit 0 of first byte is 1)
    pub fn is_multicast(&self) -> bool {
        (self.0[0] & 0x01) != 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0x00; 6]
    }

    /// A station address usable as a source: not all-zero, not multicast
    /// (which also excludes broadcast).
    pub fn is_valid(&self) -> bool {
        !self.is_zero() && !self.is_multicast()
    }

    /// Generate a locally administered unicast address from `seed`.
    ///
    /// Used when the address read back from the MAC is not valid. The seed
    /// is stirred with a 64-bit xorshift so consecutive seeds (timestamps)
    /// still produce unrelated addresses.
    pub fn random(seed: u64) -> Self {
        let mut x = seed ^ 0x9E37_79B9_7F4A_7C15;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        let b = x.to_le_bytes();
        let mut bytes = [b[0], b[1], b[2], b[3], b[4], b[5]];
        bytes[0] &= 0xFE; // clear multicast
        bytes[0] |= 0x02; // set local assignment
        Self(bytes)
    }

    /// Get the bytes of this MAC address
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

/// Parse a MAC address from a colon-separated hex string
///
/// Example: "00:80:E1:12:34:56"
impl FromStr for MacAddress {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or(())?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ())?;
        }
        if parts.next().is_some() {
            return Err(());
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Read the type/length field of a frame; `None` when shorter than a header.
pub fn frame_ethertype(frame: &[u8]) -> Option<u16> {
    if frame.len() < ETH_HLEN {
        return None;
    }
    Some(u16::from_be_bytes([frame[12], frame[13]]))
}

/// Little-endian (reflected) CRC-32, polynomial 0xEDB88320, without the
/// final inversion.
pub fn crc32_le(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    crc
}

/// Big-endian form of the Ethernet CRC of a MAC address, as the hash
/// filters of both MAC cores index it.
pub fn ether_crc(addr: &MacAddress) -> u32 {
    crc32_le(!0, &addr.0).reverse_bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate alloc;
    use alloc::string::ToString;

    #[test]
    fn test_mac_address_validity() {
        assert!(MacAddress::new([0x00, 0x80, 0xE1, 0x00, 0x00, 0x01]).is_valid());
        assert!(!MacAddress::zero().is_valid());
        assert!(!MacAddress::broadcast().is_valid());
        assert!(!MacAddress::new([0x01, 0x00, 0x5E, 0x00, 0x00, 0x01]).is_valid());
    }

    #[test]
    fn test_random_mac_is_local_unicast() {
        for seed in 0..64 {
            let mac = MacAddress::random(seed);
            assert!(mac.is_valid());
            assert_eq!(mac.0[0] & 0x03, 0x02);
        }
        assert_ne!(MacAddress::random(1), MacAddress::random(2));
    }

    #[test]
    fn test_mac_address_display() {
        let mac = MacAddress::new([0x00, 0x80, 0xE1, 0xAB, 0xCD, 0xEF]);
        assert_eq!(mac.to_string(), "00:80:E1:AB:CD:EF");
    }

    #[test]
    fn test_mac_address_from_str() {
        let mac: MacAddress = "00:80:e1:12:34:56".parse().unwrap();
        assert_eq!(mac.0, [0x00, 0x80, 0xE1, 0x12, 0x34, 0x56]);

        assert!("00:80:E1:12:34".parse::<MacAddress>().is_err());
        assert!("00:80:E1:12:34:56:78".parse::<MacAddress>().is_err());
        assert!("00:80:E1:12:34:GG".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32_le(!0, b"123456789") ^ !0, 0xCBF4_3926);
    }

    #[test]
    fn test_ether_crc_hash_index() {
        let all_hosts = ether_crc(&MacAddress::new([0x01, 0x00, 0x5E, 0x00, 0x00, 0x01]));
        assert_eq!(all_hosts, 0x7FA3_2D9B);
        assert_eq!(all_hosts >> 26, 31);

        let ipv6_all_nodes = ether_crc(&MacAddress::new([0x33, 0x33, 0x00, 0x00, 0x00, 0x01]));
        assert_eq!(ipv6_all_nodes >> 26, 62);
    }

    #[test]
    fn test_frame_ethertype() {
        let mut frame = [0u8; 60];
        frame[12] = 0x08;
        frame[13] = 0x06;
        assert_eq!(frame_ethertype(&frame), Some(ETHERTYPE_ARP));
        assert_eq!(frame_ethertype(&frame[..10]), None);
    }
}
