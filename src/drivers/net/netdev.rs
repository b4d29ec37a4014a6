//! Network Device Abstraction
//!
//! This module provides the trait the upper layer (a protocol stack, a
//! test harness, a netconsole) uses to drive an Ethernet controller,
//! together with the vocabulary types shared by every driver: errors,
//! the transmit outcome, the receive sink, the RX filter request and
//! the generic interface counters.
//!
//! ## Design Philosophy
//!
//! The trait mirrors the split a DMA driver naturally has:
//!
//! - **Open/stop**: bring the rings and the MAC up or down
//! - **Transmit**: hand an owned packet to the hardware; a full ring is
//!   reported as [`TxOutcome::Busy`] with the packet handed back, never as
//!   an error and never by dropping it
//! - **Receive**: frames are pushed into a [`PacketSink`] from `poll`, with
//!   a budget bounding the work done per call
//!
//! ## Example Usage
//!
//! ```ignore
//! use stmmac::drivers::net::{NetworkDevice, TxOutcome};
//! use stmmac::net::skbuff::SkBuff;
//!
//! netdev.open()?;
//!
//! let skb = SkBuff::from_slice(&frame)?;
//! match netdev.start_xmit(skb)? {
//!     TxOutcome::Accepted => {}
//!     TxOutcome::Busy(skb) => requeue(skb),
//! }
//!
//! let mut frames = Vec::new();
//! netdev.poll(64, &mut frames);
//! ```

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use crate::net::ethernet::MacAddress;
use crate::net::skbuff::SkBuff;

/// Errors that can occur during network device operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// Hardware is not present or not responding
    HardwareNotPresent,

    /// Device is not open
    NotInitialized,

    /// Operation not allowed while the device is running
    Busy,

    /// Transmit ring is full (try again later)
    TxBufferFull,

    /// Frame is too large for device
    FrameTooLarge,

    /// Frame is too small
    FrameTooSmall,

    /// Packet metadata is inconsistent (e.g., checksum offsets)
    InvalidPacket,

    /// Hardware or ring state inconsistency
    HardwareError,

    /// Timeout waiting for operation to complete
    Timeout,

    /// Timeout waiting for transmission to complete
    TransmitTimeout,

    /// Invalid configuration or parameter
    InvalidConfiguration,

    /// MTU outside the range supported by the MAC
    InvalidMtu,

    /// Not a usable station address
    InvalidMacAddress,

    /// Buffer or ring allocation failed
    OutOfMemory,

    /// DMA engine did not come out of reset
    DmaInitFailed,

    /// PHY could not be attached
    PhyAttachFailed,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::HardwareNotPresent => write!(f, "Hardware not present"),
            NetworkError::NotInitialized => write!(f, "Device not open"),
            NetworkError::Busy => write!(f, "Device busy"),
            NetworkError::TxBufferFull => write!(f, "Transmit buffer full"),
            NetworkError::FrameTooLarge => write!(f, "Frame too large"),
            NetworkError::FrameTooSmall => write!(f, "Frame too small"),
            NetworkError::InvalidPacket => write!(f, "Invalid packet"),
            NetworkError::HardwareError => write!(f, "Hardware error"),
            NetworkError::Timeout => write!(f, "Operation timeout"),
            NetworkError::TransmitTimeout => write!(f, "Transmit timeout"),
            NetworkError::InvalidConfiguration => write!(f, "Invalid configuration"),
            NetworkError::InvalidMtu => write!(f, "Invalid MTU"),
            NetworkError::InvalidMacAddress => write!(f, "Invalid MAC address"),
            NetworkError::OutOfMemory => write!(f, "Out of memory"),
            NetworkError::DmaInitFailed => write!(f, "DMA initialization failed"),
            NetworkError::PhyAttachFailed => write!(f, "Could not attach to PHY"),
        }
    }
}

pub type Result<T> = core::result::Result<T, NetworkError>;

/// Result of handing a packet to the driver
#[derive(Debug)]
pub enum TxOutcome {
    /// Queued for transmission; the driver owns the packet until reclaim
    Accepted,
    /// No room in the ring; the packet is handed back untouched
    Busy(SkBuff),
}

/// Receiver of frames delivered by `poll`
pub trait PacketSink {
    fn receive_packet(&mut self, skb: SkBuff);
}

impl PacketSink for Vec<SkBuff> {
    fn receive_packet(&mut self, skb: SkBuff) {
        self.push(skb);
    }
}

impl PacketSink for VecDeque<SkBuff> {
    fn receive_packet(&mut self, skb: SkBuff) {
        self.push_back(skb);
    }
}

/// Adapts a closure into a [`PacketSink`]
pub struct FnSink<F>(pub F);

impl<F: FnMut(SkBuff)> PacketSink for FnSink<F> {
    fn receive_packet(&mut self, skb: SkBuff) {
        (self.0)(skb)
    }
}

/// Requested receive filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RxFilter {
    pub promiscuous: bool,
    pub all_multicast: bool,
    pub multicast: Vec<MacAddress>,
    /// Secondary unicast addresses, in addition to the station address
    pub unicast: Vec<MacAddress>,
}

/// Declares a set of relaxed atomic counters and its `Copy` snapshot.
macro_rules! counters {
    (
        $(#[$atomic_meta:meta])*
        $atomic:ident => $(#[$snap_meta:meta])* $snap:ident {
            $($(#[$field_meta:meta])* $field:ident),* $(,)?
        }
    ) => {
        $(#[$atomic_meta])*
        #[derive(Debug, Default)]
        pub struct $atomic {
            $($(#[$field_meta])* pub $field: core::sync::atomic::AtomicU64,)*
        }

        $(#[$snap_meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $snap {
            $($(#[$field_meta])* pub $field: u64,)*
        }

        impl $atomic {
            pub fn snapshot(&self) -> $snap {
                $snap {
                    $($field: self.$field.load(core::sync::atomic::Ordering::Relaxed),)*
                }
            }

            pub fn reset(&self) {
                $(self.$field.store(0, core::sync::atomic::Ordering::Relaxed);)*
            }
        }
    };
}

pub(crate) use counters;

/// Increment a counter by one
#[inline]
pub fn bump(counter: &core::sync::atomic::AtomicU64) {
    counter.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
}

/// Add `n` to a counter
#[inline]
pub fn add(counter: &core::sync::atomic::AtomicU64, n: u64) {
    counter.fetch_add(n, core::sync::atomic::Ordering::Relaxed);
}

counters! {
    /// Interface counters, updated from any context
    NetDeviceCounters =>
    /// Snapshot of the interface counters
    NetDeviceStats {
        rx_packets,
        tx_packets,
        rx_bytes,
        tx_bytes,
        rx_errors,
        tx_errors,
        rx_dropped,
        tx_dropped,
        multicast,
        collisions,
        rx_length_errors,
        rx_over_errors,
        rx_crc_errors,
        rx_frame_errors,
        rx_fifo_errors,
        rx_missed_errors,
        tx_aborted_errors,
        tx_carrier_errors,
        tx_fifo_errors,
        tx_heartbeat_errors,
        tx_window_errors,
    }
}

/// Network device abstraction trait
///
/// # Thread Safety
///
/// Methods take `&self`; implementations serialize internally (the DMA
/// rings have their own locks), so a device can be shared between the
/// interrupt path, the transmit path and the poller.
pub trait NetworkDevice {
    /// Bring the device up: rings, DMA, MAC, PHY.
    ///
    /// # Errors
    ///
    /// - `Busy` - Already open
    /// - `OutOfMemory` - Ring or buffer allocation failed (nothing is left allocated)
    /// - `DmaInitFailed` - DMA engine reset did not complete
    /// - `PhyAttachFailed` - PHY missing or not responding
    #[must_use = "open() failure must be handled - device may not be operational"]
    fn open(&self) -> Result<()>;

    /// Take the device down and free every buffer.
    #[must_use = "stop() failure must be handled"]
    fn stop(&self) -> Result<()>;

    /// Queue a frame for transmission.
    ///
    /// Returns `Ok(TxOutcome::Busy(skb))` when the ring has no room for the
    /// frame; the caller keeps the packet and retries after `can_transmit`
    /// reports room again.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` - Device not open
    /// - `FrameTooLarge` - Frame exceeds MTU plus link-layer headers
    /// - `InvalidPacket` - Checksum request could not be resolved
    /// - `HardwareError` - Ring state inconsistent, frame dropped
    #[must_use = "start_xmit() result must be handled - frame may have been handed back"]
    fn start_xmit(&self, skb: SkBuff) -> Result<TxOutcome>;

    /// Whether the transmit queue is awake
    fn can_transmit(&self) -> bool;

    /// Deliver at most `budget` received frames to `sink`; returns the count.
    fn poll(&self, budget: usize, sink: &mut dyn PacketSink) -> usize;

    /// Get the device's MAC address
    fn mac_address(&self) -> MacAddress;

    fn mtu(&self) -> usize;

    /// Change the MTU; only allowed while the device is down.
    #[must_use = "change_mtu() failure must be handled"]
    fn change_mtu(&self, mtu: usize) -> Result<()>;

    /// Program the receive filter
    fn set_rx_mode(&self, filter: &RxFilter);

    /// Interface counters
    fn stats(&self) -> NetDeviceStats;

    /// Get link status (optional, returns false by default)
    ///
    /// Devices with PHYs should override this.
    fn link_up(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        assert_eq!(NetworkError::Busy.to_string(), "Device busy");
        assert_eq!(NetworkError::InvalidMtu.to_string(), "Invalid MTU");
        assert_eq!(
            NetworkError::PhyAttachFailed.to_string(),
            "Could not attach to PHY"
        );
    }

    #[test]
    fn test_sinks_collect_packets() {
        let mut v: Vec<SkBuff> = Vec::new();
        v.receive_packet(SkBuff::from_slice(&[1, 2, 3]).unwrap());
        assert_eq!(v.len(), 1);

        let mut q: VecDeque<SkBuff> = VecDeque::new();
        q.receive_packet(SkBuff::from_slice(&[1]).unwrap());
        assert_eq!(q.len(), 1);

        let mut total = 0;
        let mut sink = FnSink(|skb: SkBuff| total += skb.len());
        sink.receive_packet(SkBuff::from_slice(&[0; 10]).unwrap());
        sink.receive_packet(SkBuff::from_slice(&[0; 5]).unwrap());
        drop(sink);
        assert_eq!(total, 15);
    }

    #[test]
    fn test_counters_snapshot_and_reset() {
        let c = NetDeviceCounters::default();
        bump(&c.rx_packets);
        add(&c.rx_bytes, 1500);
        let s = c.snapshot();
        assert_eq!(s.rx_packets, 1);
        assert_eq!(s.rx_bytes, 1500);
        c.reset();
        assert_eq!(c.snapshot(), NetDeviceStats::default());
    }
}
