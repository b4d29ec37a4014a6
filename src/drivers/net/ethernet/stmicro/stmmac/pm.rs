//! Power management
//!
//! A plain suspend keeps the rings and their buffers allocated: the DMA is
//! stopped, every descriptor is reinitialized and, when the board allows
//! it, the PMT block is armed for wake-on-LAN. Freeze and hibernate go
//! through a full release instead and reopen on resume.

use core::sync::atomic::Ordering;

use super::common::{
    WolOpts, dma, dma_start_rx, dma_start_tx, dma_stop_rx, dma_stop_tx, mac_disable_rx,
    mac_disable_tx, mac_enable_rx, mac_enable_tx,
};
use super::hal::{RegisterIo, StmmacHal};
use super::{DeviceState, Stmmac};
use crate::drivers::net::netdev::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmEvent {
    Suspend,
    Freeze,
    Hibernate,
}

impl<R: RegisterIo, H: StmmacHal> Stmmac<R, H> {
    pub fn suspend(&self, event: PmEvent) -> Result<()> {
        if self.state() != DeviceState::Open {
            return Ok(());
        }

        if event != PmEvent::Suspend {
            self.core.lock().shutdown = true;
            self.release();
            self.state
                .store(DeviceState::Suspended as u8, Ordering::Release);
            log::info!("[STMMAC] {:?}: interface released", event);
            return Ok(());
        }

        let core = self.core.lock();

        self.stop_queue();
        if let Some(phy) = self.phy.lock().as_mut() {
            phy.stop();
        }
        self.hal.timer_stop();
        self.tasklet_enabled.store(false, Ordering::Release);
        self.napi_enabled.store(false, Ordering::Release);
        self.pending.store(0, Ordering::Release);

        dma_stop_tx(&self.regs);
        dma_stop_rx(&self.regs);

        // Clear the Rx/Tx descriptors
        if let Some(q) = self.tx.lock().as_mut() {
            q.reset(self.ops, &self.hal);
            self.regs.write(dma::TX_BASE_ADDR, q.ring.bus_addr());
        }
        if let Some(q) = self.rx.lock().as_mut() {
            q.refill(self.ops, &self.hal);
            q.init_descs(self.ops);
            // entries the refill could not fill stay with software
            let mut cursor = q.ring.dirty;
            while cursor != q.ring.cur {
                let entry = q.ring.entry(cursor);
                q.ring.desc_mut(entry).take_from_hw();
                cursor = cursor.wrapping_add(1);
            }
        }

        mac_disable_tx(&self.regs);
        // Enable Power down mode by programming the PMT regs
        if self.hal.device_may_wakeup() && core.wol_enabled {
            log::debug!("[STMMAC] arming wake-up: {:?}", core.wol_opts);
            self.ops.pmt(&self.regs, core.wol_opts);
        } else {
            mac_disable_rx(&self.regs);
        }

        self.state
            .store(DeviceState::Suspended as u8, Ordering::Release);
        log::info!("[STMMAC] suspended");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        if self.state() != DeviceState::Suspended {
            return Ok(());
        }

        let shutdown = core::mem::take(&mut self.core.lock().shutdown);
        if shutdown {
            // Re-open the interface and re-init the MAC/DMA and the rings
            self.state.store(DeviceState::Closed as u8, Ordering::Release);
            return self.open();
        }

        let core = self.core.lock();

        // The power down bit clears itself on a wake-up event; clear it
        // anyway in case another device woke the system.
        if self.hal.device_may_wakeup() && core.wol_enabled {
            self.ops.pmt(&self.regs, WolOpts::empty());
        }

        mac_enable_rx(&self.regs);
        mac_enable_tx(&self.regs);
        dma_start_tx(&self.regs);
        dma_start_rx(&self.regs);

        self.timer_start();
        self.napi_enabled.store(true, Ordering::Release);
        self.tasklet_enabled.store(true, Ordering::Release);
        self.enable_rx_irq();
        self.trans_start.store(self.hal.now_ms(), Ordering::Relaxed);
        self.state.store(DeviceState::Open as u8, Ordering::Release);

        if let Some(phy) = self.phy.lock().as_mut() {
            phy.start();
        }
        self.wake_queue();
        drop(core);

        log::info!("[STMMAC] resumed");
        Ok(())
    }
}
