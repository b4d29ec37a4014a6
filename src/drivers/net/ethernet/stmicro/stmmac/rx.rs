//! Receive path
//!
//! Every receive descriptor owns a preallocated buffer. The poller hands
//! completed buffers upward as they are and refills the vacated slots with
//! fresh ones, so no frame is ever copied.

use super::common::{BUF_SIZE_8KIB, MacOps, RxFrameStatus, STMMAC_IP_ALIGN};
use super::config::MsgLevel;
use super::hal::{BusAddr, DmaDirection, RegisterIo, StmmacHal};
use super::irq::PendingWork;
use super::ring::DescRing;
use super::{DeviceState, Stmmac};
use crate::drivers::net::netdev::{NetworkError, PacketSink, Result, add, bump};
use crate::net::ethernet::ETH_FCS_LEN;
use crate::net::skbuff::{ChecksumState, SkBuff};
use core::sync::atomic::Ordering;

/// A receive buffer and the bus address it is mapped at
pub(super) struct RxBuffer {
    skb: SkBuff,
    bus: BusAddr,
}

pub(super) struct RxQueue {
    pub ring: DescRing<RxBuffer>,
    /// Allocated size of each buffer, headroom included
    pub buf_sz: usize,
    pub rx_coalesce: i32,
    /// Descriptors carry a second buffer pointer (GMAC, 8 KiB buffers and up)
    use_buf2: bool,
}

/// Bytes of each buffer the DMA may write
fn rx_map_len(buf_sz: usize) -> usize {
    buf_sz - STMMAC_IP_ALIGN
}

impl RxQueue {
    /// Allocate the ring and every buffer, then give the whole ring to the
    /// DMA. Fails without leaking a mapping if any buffer is missing.
    pub fn new(
        hal: &dyn StmmacHal,
        ops: &dyn MacOps,
        size: usize,
        buf_sz: usize,
        rx_coalesce: i32,
    ) -> Result<Self> {
        let mut q = Self {
            ring: DescRing::allocate(hal, size)?,
            buf_sz,
            rx_coalesce,
            use_buf2: ops.enhanced_desc() && buf_sz >= BUF_SIZE_8KIB,
        };

        for entry in 0..size {
            if !q.attach_buffer(hal, entry) {
                log::error!("[STMMAC] Rx init failed at entry {} of {}", entry, size);
                q.free_all(hal);
                return Err(NetworkError::OutOfMemory);
            }
        }

        q.init_descs(ops);
        Ok(q)
    }

    /// Allocate and map a buffer into an empty slot and point the
    /// descriptor at it. Ownership is left alone.
    fn attach_buffer(&mut self, hal: &dyn StmmacHal, entry: usize) -> bool {
        let Some(mut skb) = hal.alloc_rx_buffer(self.buf_sz) else {
            return false;
        };
        if skb.reserve(STMMAC_IP_ALIGN).is_err() {
            return false;
        }

        let bus = hal.dma_map(skb.as_ptr(), rx_map_len(self.buf_sz), DmaDirection::FromDevice);
        let p = self.ring.desc_mut(entry);
        p.set_buf1(bus);
        if self.use_buf2 {
            p.set_buf2(bus.wrapping_add(BUF_SIZE_8KIB as u32));
        }
        self.ring.put_slot(entry, RxBuffer { skb, bus });
        true
    }

    /// Reinitialize every descriptor and give all of them to the DMA.
    pub fn init_descs(&mut self, ops: &dyn MacOps) {
        let len = rx_map_len(self.buf_sz);
        ops.init_rx_desc(self.ring.descs_mut(), len);
        ops.disable_rx_ic(self.ring.descs_mut(), self.rx_coalesce);
    }

    pub fn free_all(&mut self, hal: &dyn StmmacHal) {
        let len = rx_map_len(self.buf_sz);
        for (_, buf) in self.ring.drain_slots() {
            hal.dma_unmap(buf.bus, len, DmaDirection::FromDevice);
        }
        for p in self.ring.descs_mut() {
            p.set_buf1(0);
            p.set_buf2(0);
        }
    }

    /// Put a buffer under every consumed descriptor and give it back.
    /// Stops at the first allocation failure; the next poll retries.
    pub fn refill(&mut self, ops: &dyn MacOps, hal: &dyn StmmacHal) {
        while self.ring.dirty != self.ring.cur {
            let entry = self.ring.entry(self.ring.dirty);
            if self.ring.slot(entry).is_none() && !self.attach_buffer(hal, entry) {
                log::warn!("[STMMAC] Rx refill: no buffer for entry {}", entry);
                break;
            }
            ops.set_rx_owner(self.ring.desc_mut(entry));
            self.ring.dirty = self.ring.dirty.wrapping_add(1);
        }
    }
}

impl<R: RegisterIo, H: StmmacHal> Stmmac<R, H> {
    /// Deliver at most `limit` completed frames to `sink`, then refill.
    pub fn rx(&self, limit: usize, sink: &mut dyn PacketSink) -> usize {
        let mut guard = self.rx.lock();
        let Some(q) = guard.as_mut() else {
            return 0;
        };

        let ops = self.ops;
        let map_len = rx_map_len(q.buf_sz);
        let mut count = 0;

        while count < limit {
            // Every slot is still waiting for a refill
            if q.ring.cur.wrapping_sub(q.ring.dirty) as usize >= q.ring.size() {
                break;
            }
            let entry = q.ring.entry(q.ring.cur);
            if ops.get_rx_owner(q.ring.desc(entry)) {
                break;
            }
            count += 1;
            q.ring.cur = q.ring.cur.wrapping_add(1);

            let p = q.ring.desc(entry);
            let status = ops.rx_status(p, &self.stats, &self.xstats);
            if status == RxFrameStatus::Discard {
                // the buffer stays put and is given back by the refill
                bump(&self.stats.rx_errors);
                continue;
            }

            // Length should omit the CRC
            let frame_len = ops.get_rx_frame_len(p).saturating_sub(ETH_FCS_LEN);

            let Some(buf) = q.ring.slot(entry) else {
                log::error!("[STMMAC] inconsistent Rx descriptor chain at entry {}", entry);
                bump(&self.stats.rx_dropped);
                break;
            };
            if frame_len > buf.skb.tailroom() {
                log::warn!("[STMMAC] Rx frame of {} bytes overruns its buffer", frame_len);
                bump(&self.stats.rx_length_errors);
                bump(&self.stats.rx_errors);
                continue;
            }

            let Some(RxBuffer { mut skb, bus }) = q.ring.take_slot(entry) else {
                continue;
            };
            self.hal.dma_unmap(bus, map_len, DmaDirection::FromDevice);
            if skb.put(frame_len).is_err() {
                bump(&self.stats.rx_length_errors);
                continue;
            }

            skb.eth_type_trans();
            skb.set_ip_summed(if status == RxFrameStatus::CsumUnnecessary && self.rx_csum {
                ChecksumState::Unnecessary
            } else {
                ChecksumState::None
            });

            if self.msg_level().contains(MsgLevel::PKTDATA) {
                log::trace!(
                    "[STMMAC] rx: entry {}, {} bytes, proto {:#06x}, {:?}",
                    entry,
                    frame_len,
                    skb.protocol(),
                    status
                );
            }

            sink.receive_packet(skb);
            bump(&self.stats.rx_packets);
            add(&self.stats.rx_bytes, frame_len as u64);
        }

        q.refill(ops, &self.hal);
        count
    }

    /// Receive poll. Below budget, the poll completes: the receive
    /// interrupt is re-enabled and the mitigation timer restarted. At
    /// budget, the poll stays scheduled.
    pub fn poll(&self, budget: usize, sink: &mut dyn PacketSink) -> usize {
        if !self.napi_enabled.load(Ordering::Acquire) || self.state() != DeviceState::Open {
            return 0;
        }

        let work_done = self.rx(budget, sink);

        bump(&self.xstats.rx_poll_n);
        add(&self.xstats.rx_pkt_n, work_done as u64);

        if work_done < budget {
            self.pending
                .fetch_and(!PendingWork::RX_POLL.bits(), Ordering::AcqRel);
            self.enable_rx_irq();
            self.timer_start();
        } else {
            self.pending
                .fetch_or(PendingWork::RX_POLL.bits(), Ordering::AcqRel);
        }
        work_done
    }
}
