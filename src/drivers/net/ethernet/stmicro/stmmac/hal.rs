//! Platform glue: register access and DMA mapping
//!
//! The driver core never touches physical memory or the bus directly. The
//! board supplies a [`RegisterIo`] for the MAC's register window (usually
//! [`Mmio`]) and a [`StmmacHal`] for everything the DMA engine needs:
//! bus addresses for the descriptor rings, streaming mappings for packet
//! buffers, receive buffer allocation and a clock.

use core::sync::atomic::{Ordering, fence};
use volatile::Volatile;

use crate::net::skbuff::SkBuff;

/// Address as seen by the DMA engine. The descriptors carry 32-bit pointers.
pub type BusAddr = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// CPU to device (transmit)
    ToDevice,
    /// Device to CPU (receive)
    FromDevice,
}

/// 32-bit register window of one MAC instance
pub trait RegisterIo: Send + Sync {
    fn read(&self, offset: usize) -> u32;

    /// Write a register. Implementations order all earlier memory accesses
    /// (descriptor updates in particular) before the write reaches the device.
    fn write(&self, offset: usize, value: u32);

    fn set_bits(&self, offset: usize, bits: u32) {
        let value = self.read(offset);
        self.write(offset, value | bits);
    }

    fn clear_bits(&self, offset: usize, bits: u32) {
        let value = self.read(offset);
        self.write(offset, value & !bits);
    }
}

/// Memory-mapped register window
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must be the virtual address of the MAC's register window,
    /// mapped as device memory and valid for the lifetime of the driver.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl RegisterIo for Mmio {
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `new` guarantees the window is mapped; offsets are
        // register constants inside it and 4-byte aligned.
        unsafe {
            let reg = (self.base + offset) as *const Volatile<u32>;
            (*reg).read()
        }
    }

    #[inline]
    fn write(&self, offset: usize, value: u32) {
        // Descriptor and buffer writes must be visible before e.g. a poll
        // demand reaches the DMA engine.
        fence(Ordering::SeqCst);
        // SAFETY: as for `read`.
        unsafe {
            let reg = (self.base + offset) as *mut Volatile<u32>;
            (*reg).write(value);
        }
    }
}

// SAFETY: the window is device memory; every access is a single volatile
// 32-bit load or store.
unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}

/// Services the platform provides to the driver core
///
/// The descriptor rings live in ordinary heap memory owned by the driver;
/// the platform must either keep that memory coherent with the DMA engine
/// or map the heap uncached. Packet buffers go through `dma_map` /
/// `dma_unmap`, which is where cache maintenance belongs.
pub trait StmmacHal: Send + Sync {
    /// Bus address of driver-owned coherent memory (descriptor rings)
    fn virt_to_bus(&self, vaddr: *const u8) -> BusAddr;

    /// Map `len` bytes at `vaddr` for a streaming transfer
    fn dma_map(&self, vaddr: *const u8, len: usize, dir: DmaDirection) -> BusAddr;

    /// Undo a `dma_map` with the same length and direction
    fn dma_unmap(&self, bus: BusAddr, len: usize, dir: DmaDirection);

    /// Allocate a receive buffer with `size` bytes of tailroom.
    ///
    /// `None` is a recoverable condition: the ring keeps the slot empty
    /// and retries at the next poll.
    fn alloc_rx_buffer(&self, size: usize) -> Option<SkBuff> {
        SkBuff::alloc(size).ok()
    }

    fn delay_us(&self, us: u32);

    /// Monotonic milliseconds, used by the transmit watchdog
    fn now_ms(&self) -> u64;

    /// Entropy for the random MAC address fallback
    fn random_seed(&self) -> u64 {
        self.now_ms()
    }

    /// Arm the interrupt mitigation timer at `rate_hz`. Platforms without a
    /// suitable timer leave this a no-op; the driver then relies on the
    /// DMA interrupts alone.
    fn timer_start(&self, _rate_hz: u32) {}

    fn timer_stop(&self) {}

    /// Whether the device is allowed to wake the system
    fn device_may_wakeup(&self) -> bool {
        false
    }
}
