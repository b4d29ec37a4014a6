//! Socket Buffer (sk_buff) - Linux-inspired packet buffer
//!
//! The driver hands packets to and from the upper layer as `SkBuff`s. A
//! buffer owns one contiguous heap area (the linear part, with headroom
//! and tailroom) plus an optional list of page fragments, mirroring the
//! scatter-gather layout the MAC's descriptor chains can transmit.
//!
//! # Layout
//!
//! ```text
//! ┌──────────┬──────────────────────────┬───────────┐
//! │ headroom │  linear data (headlen)   │ tailroom  │   buf
//! └──────────┴──────────────────────────┴───────────┘
//!            ^ data                     ^ data + headlen
//!
//! frags: [frag 0][frag 1]...   (at most MAX_SKB_FRAGS)
//! ```
//!
//! Receive buffers are allocated zero-filled at their full size; the DMA
//! engine writes into the tailroom and `put` then claims the received
//! bytes without copying.
//!
//! # References
//!
//! - Linux kernel sk_buff: <https://docs.kernel.org/networking/skbuff.html>

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::net::ethernet::{ETH_P_802_3_MIN, frame_ethertype};

/// Maximum number of page fragments a buffer may carry
pub const MAX_SKB_FRAGS: usize = 16;

/// Protocol value recorded for 802.3 length-framed packets
pub const ETH_P_802_3: u16 = 0x0001;

/// Checksum state of a packet
///
/// `Partial` on transmit asks the driver (or the hardware) to fill in the
/// Internet checksum covering `[start..]` and to store it at
/// `start + offset`. `Unnecessary` on receive means the MAC verified it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumState {
    #[default]
    None,
    Partial { start: usize, offset: usize },
    Unnecessary,
}

/// Errors that can occur during sk_buff operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkBuffError {
    /// Heap allocation failed (out of memory)
    AllocationFailed,

    /// Too many fragments attached
    TooManyFragments,

    /// Invalid packet data (e.g., checksum offsets outside the packet)
    InvalidPacket,

    /// Not enough headroom to reserve
    InsufficientHeadroom,

    /// Not enough tailroom to extend the data area
    InsufficientTailroom,
}

impl fmt::Display for SkBuffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed => write!(f, "heap allocation failed"),
            Self::TooManyFragments => write!(f, "fragment limit reached"),
            Self::InvalidPacket => write!(f, "invalid packet data"),
            Self::InsufficientHeadroom => write!(f, "insufficient headroom"),
            Self::InsufficientTailroom => write!(f, "insufficient tailroom"),
        }
    }
}

/// Socket buffer - Linux sk_buff equivalent
pub struct SkBuff {
    /// Backing store of the linear part, zero-initialized at allocation
    buf: Vec<u8>,

    /// Offset of the first data byte in `buf`
    data: usize,

    /// Length of the linear part
    headlen: usize,

    frags: Vec<Box<[u8]>>,

    ip_summed: ChecksumState,

    /// EtherType recorded by `eth_type_trans`
    protocol: u16,
}

impl SkBuff {
    /// Allocate an empty buffer with `size` bytes of tailroom.
    ///
    /// Fails with `AllocationFailed` instead of aborting when the heap is
    /// exhausted; the RX refill path relies on that to retry later.
    pub fn alloc(size: usize) -> Result<Self, SkBuffError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| SkBuffError::AllocationFailed)?;
        buf.resize(size, 0);
        Ok(Self {
            buf,
            data: 0,
            headlen: 0,
            frags: Vec::new(),
            ip_summed: ChecksumState::None,
            protocol: 0,
        })
    }

    /// Allocate a buffer holding a copy of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SkBuffError> {
        let mut skb = Self::alloc(bytes.len())?;
        skb.put(bytes.len())?.copy_from_slice(bytes);
        Ok(skb)
    }

    /// Move the (empty) data area forward by `n` bytes of headroom.
    pub fn reserve(&mut self, n: usize) -> Result<(), SkBuffError> {
        if self.headlen != 0 || self.data + n > self.buf.len() {
            return Err(SkBuffError::InsufficientHeadroom);
        }
        self.data += n;
        Ok(())
    }

    /// Extend the linear part by `n` bytes and return the new region.
    pub fn put(&mut self, n: usize) -> Result<&mut [u8], SkBuffError> {
        if n > self.tailroom() {
            return Err(SkBuffError::InsufficientTailroom);
        }
        let start = self.data + self.headlen;
        self.headlen += n;
        Ok(&mut self.buf[start..start + n])
    }

    /// Shrink the linear part to `len` bytes; no-op when already shorter.
    pub fn trim(&mut self, len: usize) {
        if len < self.headlen {
            self.headlen = len;
        }
    }

    /// Bytes available after the linear part
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.data - self.headlen
    }

    /// Start of the data area. Receive buffers are mapped for DMA from here.
    pub fn as_ptr(&self) -> *const u8 {
        self.buf[self.data..].as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buf[self.data..].as_mut_ptr()
    }

    /// Linear data
    pub fn data(&self) -> &[u8] {
        &self.buf[self.data..self.data + self.headlen]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.data..self.data + self.headlen]
    }

    /// Total length: linear part plus fragments
    pub fn len(&self) -> usize {
        self.headlen + self.frags.iter().map(|f| f.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the linear part only
    pub fn headlen(&self) -> usize {
        self.headlen
    }

    pub fn frags(&self) -> &[Box<[u8]>] {
        &self.frags
    }

    pub fn nr_frags(&self) -> usize {
        self.frags.len()
    }

    /// Attach a fragment after the existing data.
    pub fn push_frag(&mut self, frag: Box<[u8]>) -> Result<(), SkBuffError> {
        if self.frags.len() >= MAX_SKB_FRAGS {
            return Err(SkBuffError::TooManyFragments);
        }
        self.frags
            .try_reserve(1)
            .map_err(|_| SkBuffError::AllocationFailed)?;
        self.frags.push(frag);
        Ok(())
    }

    /// Pull every fragment into the linear part.
    pub fn linearize(&mut self) -> Result<(), SkBuffError> {
        if self.frags.is_empty() {
            return Ok(());
        }
        let extra = self.len() - self.headlen;
        let need = self.data + self.headlen + extra;
        if need > self.buf.len() {
            self.buf
                .try_reserve_exact(need - self.buf.len())
                .map_err(|_| SkBuffError::AllocationFailed)?;
            self.buf.resize(need, 0);
        }
        for frag in core::mem::take(&mut self.frags) {
            self.put(frag.len())?.copy_from_slice(&frag);
        }
        Ok(())
    }

    pub fn ip_summed(&self) -> ChecksumState {
        self.ip_summed
    }

    pub fn set_ip_summed(&mut self, state: ChecksumState) {
        self.ip_summed = state;
    }

    pub fn protocol(&self) -> u16 {
        self.protocol
    }

    /// Record the protocol from the Ethernet header, 802.3 for length
    /// fields. The header stays in place.
    pub fn eth_type_trans(&mut self) -> u16 {
        self.protocol = match frame_ethertype(self.data()) {
            Some(t) if t >= ETH_P_802_3_MIN => t,
            _ => ETH_P_802_3,
        };
        self.protocol
    }

    /// Resolve a `Partial` checksum in software.
    ///
    /// The 16-bit one's complement sum of everything from `start` to the end
    /// of the packet (fragments included) is folded, complemented and
    /// stored big-endian at `start + offset`. The field is expected to hold
    /// the pseudo-header seed, as the stack leaves it.
    pub fn checksum_help(&mut self) -> Result<(), SkBuffError> {
        let ChecksumState::Partial { start, offset } = self.ip_summed else {
            return Ok(());
        };
        if start > self.headlen || start + offset + 2 > self.headlen {
            return Err(SkBuffError::InvalidPacket);
        }

        let mut sum = 0u64;
        let mut pos = 0usize;
        let chunks = core::iter::once(&self.data()[start..]).chain(self.frags.iter().map(|f| &f[..]));
        for chunk in chunks {
            for &byte in chunk {
                sum += if pos % 2 == 0 {
                    (byte as u64) << 8
                } else {
                    byte as u64
                };
                pos += 1;
            }
        }
        let csum = !fold_csum(sum);

        let at = start + offset;
        self.data_mut()[at..at + 2].copy_from_slice(&csum.to_be_bytes());
        self.ip_summed = ChecksumState::None;
        Ok(())
    }
}

fn fold_csum(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

impl fmt::Debug for SkBuff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkBuff")
            .field("len", &self.len())
            .field("headlen", &self.headlen)
            .field("nr_frags", &self.frags.len())
            .field("headroom", &self.data)
            .field("ip_summed", &self.ip_summed)
            .field("protocol", &format_args!("{:#06x}", self.protocol))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_alloc_reserve_put() {
        let mut skb = SkBuff::alloc(64).unwrap();
        assert!(skb.is_empty());
        skb.reserve(2).unwrap();
        assert_eq!(skb.tailroom(), 62);

        skb.put(10).unwrap().copy_from_slice(&[7u8; 10]);
        assert_eq!(skb.len(), 10);
        assert_eq!(skb.data(), &[7u8; 10]);

        // headroom can only be reserved on an empty buffer
        assert_eq!(skb.reserve(1), Err(SkBuffError::InsufficientHeadroom));
        assert_eq!(skb.put(53).err(), Some(SkBuffError::InsufficientTailroom));
    }

    #[test]
    fn test_trim() {
        let mut skb = SkBuff::from_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        skb.trim(4);
        assert_eq!(skb.data(), &[1, 2, 3, 4]);
        skb.trim(10);
        assert_eq!(skb.len(), 4);
    }

    #[test]
    fn test_fragments_count_towards_len() {
        let mut skb = SkBuff::from_slice(&[0u8; 100]).unwrap();
        skb.push_frag(vec![1u8; 300].into_boxed_slice()).unwrap();
        skb.push_frag(vec![2u8; 200].into_boxed_slice()).unwrap();
        assert_eq!(skb.headlen(), 100);
        assert_eq!(skb.len(), 600);
        assert_eq!(skb.nr_frags(), 2);

        skb.linearize().unwrap();
        assert_eq!(skb.nr_frags(), 0);
        assert_eq!(skb.headlen(), 600);
        assert_eq!(skb.data()[100], 1);
        assert_eq!(skb.data()[599], 2);
    }

    #[test]
    fn test_fragment_limit() {
        let mut skb = SkBuff::alloc(0).unwrap();
        for _ in 0..MAX_SKB_FRAGS {
            skb.push_frag(vec![0u8; 4].into_boxed_slice()).unwrap();
        }
        assert_eq!(
            skb.push_frag(vec![0u8; 4].into_boxed_slice()),
            Err(SkBuffError::TooManyFragments)
        );
    }

    #[test]
    fn test_checksum_help_ipv4_header() {
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let mut skb = SkBuff::from_slice(&header).unwrap();
        skb.set_ip_summed(ChecksumState::Partial {
            start: 0,
            offset: 10,
        });
        skb.checksum_help().unwrap();
        assert_eq!(&skb.data()[10..12], &[0xb8, 0x61]);
        assert_eq!(skb.ip_summed(), ChecksumState::None);
    }

    #[test]
    fn test_checksum_help_spans_fragments() {
        // the same header split at an odd boundary must sum identically
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let mut skb = SkBuff::from_slice(&header[..13]).unwrap();
        skb.push_frag(header[13..].to_vec().into_boxed_slice())
            .unwrap();
        skb.set_ip_summed(ChecksumState::Partial {
            start: 0,
            offset: 10,
        });
        skb.checksum_help().unwrap();
        assert_eq!(&skb.data()[10..12], &[0xb8, 0x61]);
    }

    #[test]
    fn test_checksum_help_rejects_bad_offsets() {
        let mut skb = SkBuff::from_slice(&[0u8; 20]).unwrap();
        skb.set_ip_summed(ChecksumState::Partial {
            start: 10,
            offset: 10,
        });
        assert_eq!(skb.checksum_help(), Err(SkBuffError::InvalidPacket));
    }

    #[test]
    fn test_eth_type_trans() {
        let mut frame = [0u8; 60];
        frame[12] = 0x08;
        let mut skb = SkBuff::from_slice(&frame).unwrap();
        assert_eq!(skb.eth_type_trans(), 0x0800);

        frame[12] = 0x00;
        frame[13] = 0x2e;
        let mut skb = SkBuff::from_slice(&frame).unwrap();
        assert_eq!(skb.eth_type_trans(), ETH_P_802_3);
    }
}
