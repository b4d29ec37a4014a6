//! Transmit path
//!
//! Frames are mapped straight out of the `SkBuff`: one descriptor for the
//! linear part (two for jumbo heads above 8 KiB) and one per fragment. The
//! packet is parked in the slot of its first descriptor until the whole
//! chain has been reclaimed. No descriptor is given to the DMA before all
//! of its fields are written, and the first one of a chain goes last.

use super::common::{BUF_SIZE_4KIB, BUF_SIZE_8KIB, MacOps, TxFrameStatus, dma};
use super::config::{MsgLevel, TX_NO_COALESCE};
use super::hal::{DmaDirection, RegisterIo, StmmacHal};
use super::ring::DescRing;
use super::{DeviceState, Stmmac};
use crate::drivers::net::netdev::{NetworkError, Result, TxOutcome, add, bump};
use crate::net::ethernet::{ETH_HLEN, VLAN_HLEN};
use crate::net::skbuff::{ChecksumState, MAX_SKB_FRAGS, SkBuff};
use core::sync::atomic::Ordering;

pub(super) struct TxQueue {
    pub ring: DescRing<SkBuff>,
    /// Frames sent without a completion interrupt since the last one
    pub coalesce_count: i32,
    /// `Config::tx_coalesce` at open, -1 when disabled
    pub coalesce_limit: i32,
    /// Packet whose first descriptor is reclaimed but whose last is not
    reclaiming: Option<SkBuff>,
}

/// Free descriptors below which the queue is stopped after a submission,
/// and above which the reclaimer wakes it again.
pub(super) fn tx_stop_threshold(ring_size: usize) -> u32 {
    (MAX_SKB_FRAGS as u32 + 1).min(ring_size as u32 / 4)
}

impl TxQueue {
    pub fn new(hal: &dyn StmmacHal, ops: &dyn MacOps, size: usize, coalesce: i32) -> Result<Self> {
        let mut ring = DescRing::allocate(hal, size)?;
        ops.init_tx_desc(ring.descs_mut());
        Ok(Self {
            ring,
            coalesce_count: 0,
            coalesce_limit: coalesce,
            reclaiming: None,
        })
    }

    /// Unmap every live mapping and drop every queued packet, completed
    /// or not.
    pub fn free_all(&mut self, ops: &dyn MacOps, hal: &dyn StmmacHal) {
        for i in 0..self.ring.size() {
            let p = self.ring.desc_mut(i);
            let bus = p.buf1();
            if bus != 0 {
                hal.dma_unmap(bus, ops.get_tx_len(p), DmaDirection::ToDevice);
                p.set_buf1(0);
                p.set_buf2(0);
            }
        }
        let dropped = self.ring.drain_slots().count();
        if dropped > 0 {
            log::debug!("[STMMAC] freed {} pending Tx frames", dropped);
        }
        self.reclaiming = None;
    }

    /// Back to an empty ring owned by software, cursors at zero.
    pub fn reset(&mut self, ops: &dyn MacOps, hal: &dyn StmmacHal) {
        self.free_all(ops, hal);
        ops.init_tx_desc(self.ring.descs_mut());
        self.ring.reset_cursors();
        self.coalesce_count = 0;
    }
}

impl<R: RegisterIo, H: StmmacHal> Stmmac<R, H> {
    /// Queue a frame.
    ///
    /// A full ring hands the packet back as [`TxOutcome::Busy`]. The first
    /// descriptor of the chain is given to the DMA last, after every other
    /// field of the chain has been written.
    pub fn transmit(&self, mut skb: SkBuff) -> Result<TxOutcome> {
        if self.state() != DeviceState::Open {
            return Err(NetworkError::NotInitialized);
        }
        if skb.len() > self.mtu() + ETH_HLEN + VLAN_HLEN {
            log::warn!("[STMMAC] dropping oversized frame ({} bytes)", skb.len());
            bump(&self.stats.tx_dropped);
            return Err(NetworkError::FrameTooLarge);
        }

        let mut guard = self.tx.lock();
        let Some(q) = guard.as_mut() else {
            return Err(NetworkError::NotInitialized);
        };

        let jumbo = skb.len() >= BUF_SIZE_4KIB;
        let split_head = jumbo && skb.headlen() > BUF_SIZE_8KIB;
        let needed = skb.nr_frags() + 1 + split_head as usize;
        if (q.ring.avail() as usize) < needed {
            if !self.queue_stopped.swap(true, Ordering::AcqRel) {
                log::error!("[STMMAC] Tx ring full when queue awake");
            }
            return Ok(TxOutcome::Busy(skb));
        }

        let first = q.ring.entry(q.ring.cur);
        if q.ring.slot(first).is_some() {
            log::error!("[STMMAC] inconsistent Tx skb utilization at entry {}", first);
            bump(&self.stats.tx_dropped);
            return Err(NetworkError::HardwareError);
        }

        let mut csum_insertion = false;
        if let ChecksumState::Partial { .. } = skb.ip_summed() {
            if self.tx_coe() {
                csum_insertion = true;
            } else if skb.checksum_help().is_err() {
                bump(&self.stats.tx_dropped);
                return Err(NetworkError::InvalidPacket);
            }
        }

        let ops = self.ops;
        let hal = &self.hal;
        let mut cur = q.ring.cur;
        let head = skb.data();

        if split_head {
            let rest = head.len() - BUF_SIZE_8KIB;

            let bus = hal.dma_map(head.as_ptr(), BUF_SIZE_8KIB, DmaDirection::ToDevice);
            let p = q.ring.desc_mut(first);
            p.set_buf1(bus);
            p.set_buf2(bus.wrapping_add(BUF_SIZE_4KIB as u32));
            ops.prepare_tx_desc(p, true, BUF_SIZE_8KIB, csum_insertion);

            cur = cur.wrapping_add(1);
            let bus = hal.dma_map(head[BUF_SIZE_8KIB..].as_ptr(), rest, DmaDirection::ToDevice);
            let p = q.ring.desc_mut(q.ring.entry(cur));
            p.set_buf1(bus);
            p.set_buf2(bus.wrapping_add(BUF_SIZE_4KIB as u32));
            ops.prepare_tx_desc(p, false, rest, csum_insertion);
        } else {
            let bus = hal.dma_map(head.as_ptr(), head.len(), DmaDirection::ToDevice);
            let p = q.ring.desc_mut(first);
            p.set_buf1(bus);
            if jumbo {
                p.set_buf2(bus.wrapping_add(BUF_SIZE_4KIB as u32));
            }
            ops.prepare_tx_desc(p, true, head.len(), csum_insertion);
        }

        for frag in skb.frags() {
            cur = cur.wrapping_add(1);
            let bus = hal.dma_map(frag.as_ptr(), frag.len(), DmaDirection::ToDevice);
            let p = q.ring.desc_mut(q.ring.entry(cur));
            p.set_buf1(bus);
            ops.prepare_tx_desc(p, false, frag.len(), csum_insertion);
        }

        // Interrupt on completion only for the last segment
        let last = q.ring.entry(cur);
        ops.close_tx_desc(q.ring.desc_mut(last));

        let len = skb.len();
        if self.msg_level().contains(MsgLevel::PKTDATA) {
            log::trace!(
                "[STMMAC] xmit: entry {}..={}, {} bytes, {} frags, csum {}",
                first,
                last,
                len,
                skb.nr_frags(),
                csum_insertion
            );
        }
        let start = q.ring.cur;
        q.ring.put_slot(first, skb);
        q.ring.cur = cur.wrapping_add(1);

        // Settle the completion interrupt before the chain is published;
        // once the first OWN bit is set the DMA may finish at any time.
        let half_duplex = !self.full_duplex.load(Ordering::Relaxed);
        if q.ring.avail() <= tx_stop_threshold(q.ring.size()) || (half_duplex && csum_insertion) {
            self.stop_queue();
        } else if q.coalesce_count <= q.coalesce_limit {
            q.coalesce_count += 1;
            ops.clear_tx_ic(q.ring.desc_mut(last));
        } else {
            q.coalesce_count = 0;
        }

        // Every field of the chain is final: publish the trailing
        // descriptors, then the first one.
        let mut cursor = start.wrapping_add(1);
        while cursor != q.ring.cur {
            let entry = q.ring.entry(cursor);
            ops.set_tx_owner(q.ring.desc_mut(entry));
            cursor = cursor.wrapping_add(1);
        }
        ops.set_tx_owner(q.ring.desc_mut(first));
        drop(guard);

        add(&self.stats.tx_bytes, len as u64);
        self.regs.write(dma::XMT_POLL_DEMAND, 1);
        self.trans_start.store(self.hal.now_ms(), Ordering::Relaxed);

        Ok(TxOutcome::Accepted)
    }

    /// Reclaim descriptors the DMA has finished with.
    pub fn tx_clean(&self) {
        let mut guard = self.tx.lock();
        if let Some(q) = guard.as_mut() {
            self.tx_clean_locked(q);
        }
    }

    pub(super) fn tx_clean_locked(&self, q: &mut TxQueue) {
        let ops = self.ops;
        let mut reclaimed = 0u32;

        while q.ring.dirty != q.ring.cur {
            let entry = q.ring.entry(q.ring.dirty);
            let p = q.ring.desc_mut(entry);
            if ops.get_tx_owner(p) {
                break;
            }

            // Errors are reported on the last segment only
            let last = ops.get_tx_ls(p);
            if last {
                match ops.tx_status(p, &self.stats, &self.xstats) {
                    TxFrameStatus::Ok => {
                        bump(&self.stats.tx_packets);
                        bump(&self.xstats.tx_pkt_n);
                    }
                    TxFrameStatus::Error => bump(&self.stats.tx_errors),
                }
            }

            let bus = p.buf1();
            if bus != 0 {
                self.hal.dma_unmap(bus, ops.get_tx_len(p), DmaDirection::ToDevice);
                p.set_buf1(0);
            }
            p.set_buf2(0);
            ops.release_tx_desc(p);

            if let Some(skb) = q.ring.take_slot(entry) {
                q.reclaiming = Some(skb);
            }
            if last {
                q.reclaiming = None;
            }

            q.ring.dirty = q.ring.dirty.wrapping_add(1);
            reclaimed += 1;
        }

        if reclaimed > 0 {
            self.trans_start.store(self.hal.now_ms(), Ordering::Relaxed);
        }

        if self.queue_stopped() && q.ring.avail() > tx_stop_threshold(q.ring.size()) {
            self.wake_queue();
        }
    }

    /// The transmitter made no progress: drop interrupt moderation and
    /// restart the ring from scratch.
    pub fn tx_timeout(&self) {
        let now = self.hal.now_ms();
        let latency = now.saturating_sub(self.trans_start.load(Ordering::Relaxed));
        log::warn!("[STMMAC] Tx timeout at {} ms, latency {} ms", now, latency);

        self.core.lock().config.tx_coalesce = TX_NO_COALESCE;
        if let Some(q) = self.tx.lock().as_mut() {
            log::debug!(
                "[STMMAC] Tx ring: cur {}, dirty {}",
                q.ring.entry(q.ring.cur),
                q.ring.entry(q.ring.dirty)
            );
            if self.msg_level().contains(MsgLevel::TX_ERR) {
                q.ring.dump("TX");
            }
            q.coalesce_limit = TX_NO_COALESCE;
            q.coalesce_count = 0;
        }

        self.tx_err();
        self.trans_start.store(self.hal.now_ms(), Ordering::Relaxed);
    }

    /// Aggregate transmit watchdog. Frames pending with no completion for
    /// the configured `watchdog` milliseconds trigger [`tx_timeout`].
    /// Returns whether the recovery ran.
    ///
    /// [`tx_timeout`]: Self::tx_timeout
    pub fn tx_watchdog(&self, now_ms: u64) -> bool {
        if self.state() != DeviceState::Open {
            return false;
        }

        self.tx_clean();

        let pending = self
            .tx
            .lock()
            .as_ref()
            .is_some_and(|q| q.ring.in_flight() > 0);
        if !pending && !self.queue_stopped() {
            return false;
        }

        let watchdog = self.core.lock().config.watchdog.max(0) as u64;
        let idle = now_ms.saturating_sub(self.trans_start.load(Ordering::Relaxed));
        if idle < watchdog {
            return false;
        }

        self.tx_timeout();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_threshold() {
        assert_eq!(tx_stop_threshold(128), MAX_SKB_FRAGS as u32 + 1);
        assert_eq!(tx_stop_threshold(512), MAX_SKB_FRAGS as u32 + 1);
        assert_eq!(tx_stop_threshold(16), 4);
        assert_eq!(tx_stop_threshold(4), 1);
    }
}
