//! Descriptor rings and their buffer slots
//!
//! A ring is an array of [`DmaDesc`] plus one buffer slot per descriptor,
//! indexed in lockstep. Two free-running cursors walk it: `cur` is where
//! software produces next, `dirty` is the oldest entry not yet reclaimed.
//! The ring size is a power of two so the cursors can wrap at 2^32 without
//! the entry index jumping.

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::descs::DmaDesc;
use super::hal::{BusAddr, StmmacHal};
use crate::drivers::net::netdev::{NetworkError, Result};

pub(super) struct DescRing<T> {
    descs: Box<[DmaDesc]>,
    /// Bus address of `descs[0]`, programmed into the DMA base register
    bus: BusAddr,
    slots: Vec<Option<T>>,
    /// Next entry software will produce
    pub cur: u32,
    /// Oldest entry not yet consumed or reclaimed
    pub dirty: u32,
}

impl<T> DescRing<T> {
    /// Allocate `size` zeroed descriptors and empty slots.
    ///
    /// `size` must already be a power of two (see `config::align_ring_size`).
    pub fn allocate(hal: &dyn StmmacHal, size: usize) -> Result<Self> {
        debug_assert!(size.is_power_of_two());

        let mut descs = Vec::new();
        descs
            .try_reserve_exact(size)
            .map_err(|_| NetworkError::OutOfMemory)?;
        descs.resize_with(size, DmaDesc::new);
        let descs = descs.into_boxed_slice();

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(size)
            .map_err(|_| NetworkError::OutOfMemory)?;
        slots.resize_with(size, || None);

        let bus = hal.virt_to_bus(descs.as_ptr() as *const u8);

        Ok(Self {
            descs,
            bus,
            slots,
            cur: 0,
            dirty: 0,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.descs.len()
    }

    /// Index of the entry a cursor points at
    #[inline]
    pub fn entry(&self, cursor: u32) -> usize {
        cursor as usize & (self.size() - 1)
    }

    pub fn bus_addr(&self) -> BusAddr {
        self.bus
    }

    #[inline]
    pub fn desc(&self, entry: usize) -> &DmaDesc {
        &self.descs[entry]
    }

    #[inline]
    pub fn desc_mut(&mut self, entry: usize) -> &mut DmaDesc {
        &mut self.descs[entry]
    }

    pub fn descs(&self) -> &[DmaDesc] {
        &self.descs
    }

    pub fn descs_mut(&mut self) -> &mut [DmaDesc] {
        &mut self.descs
    }

    pub fn slot(&self, entry: usize) -> Option<&T> {
        self.slots[entry].as_ref()
    }

    pub fn take_slot(&mut self, entry: usize) -> Option<T> {
        self.slots[entry].take()
    }

    /// Fill an empty slot. Returns the previous occupant if there was one.
    pub fn put_slot(&mut self, entry: usize, value: T) -> Option<T> {
        self.slots[entry].replace(value)
    }

    /// Free entries for the producer. One entry always stays empty so a
    /// full ring is distinguishable from an empty one.
    #[inline]
    pub fn avail(&self) -> u32 {
        self.dirty
            .wrapping_add(self.size() as u32)
            .wrapping_sub(self.cur)
            .wrapping_sub(1)
    }

    /// Entries produced but not yet consumed
    #[inline]
    pub fn in_flight(&self) -> u32 {
        self.cur.wrapping_sub(self.dirty)
    }

    pub fn reset_cursors(&mut self) {
        self.cur = 0;
        self.dirty = 0;
    }

    /// Empty every slot, yielding the entry index and its contents.
    pub fn drain_slots(&mut self) -> impl Iterator<Item = (usize, T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.take().map(|v| (i, v)))
    }

    /// Log every descriptor. Only used at high message levels.
    pub fn dump(&self, name: &str) {
        log::debug!("[STMMAC] {} ring: cur {} dirty {} (base {:#010x})", name, self.cur, self.dirty, self.bus);
        for (i, d) in self.descs.iter().enumerate() {
            log::debug!(
                "[STMMAC]   {:3} [{:#010x}]: {:#010x} {:#010x} {:#010x} {:#010x}",
                i,
                self.bus as usize + i * core::mem::size_of::<DmaDesc>(),
                d.des0(),
                d.des1(),
                d.buf1(),
                d.buf2()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::ethernet::stmicro::stmmac::testing::FakeHal;

    #[test]
    fn test_allocate_zeroed() {
        let hal = FakeHal::new();
        let ring: DescRing<u32> = DescRing::allocate(&hal, 8).unwrap();
        assert_eq!(ring.size(), 8);
        assert!(ring.descs().iter().all(|d| d.des0() == 0 && d.buf1() == 0));
        assert!((0..8).all(|i| ring.slot(i).is_none()));
        assert_eq!(ring.bus_addr(), hal.virt_to_bus(ring.descs().as_ptr() as *const u8));
    }

    #[test]
    fn test_empty_ring_accounting() {
        let hal = FakeHal::new();
        let ring: DescRing<u32> = DescRing::allocate(&hal, 16).unwrap();
        assert_eq!(ring.avail(), 15);
        assert_eq!(ring.in_flight(), 0);
    }

    #[test]
    fn test_cursors_wrap_at_u32_max() {
        let hal = FakeHal::new();
        let mut ring: DescRing<u32> = DescRing::allocate(&hal, 4).unwrap();
        ring.cur = u32::MAX;
        ring.dirty = u32::MAX - 2;
        assert_eq!(ring.in_flight(), 2);
        assert_eq!(ring.avail(), 1);
        assert_eq!(ring.entry(ring.cur), 3);

        ring.cur = ring.cur.wrapping_add(1);
        assert_eq!(ring.entry(ring.cur), 0);
        assert_eq!(ring.in_flight(), 3);
        assert_eq!(ring.avail(), 0);
        assert_eq!(ring.avail() + ring.in_flight(), 3);
    }

    #[test]
    fn test_slots() {
        let hal = FakeHal::new();
        let mut ring: DescRing<u32> = DescRing::allocate(&hal, 4).unwrap();
        assert!(ring.put_slot(1, 10).is_none());
        assert_eq!(ring.put_slot(1, 11), Some(10));
        ring.put_slot(3, 30);
        let drained: Vec<_> = ring.drain_slots().collect();
        assert_eq!(drained, vec![(1, 11), (3, 30)]);
        assert!(ring.take_slot(1).is_none());
    }
}
