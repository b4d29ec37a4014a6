//! Interrupt dispatch and deferred work
//!
//! [`Stmmac::interrupt`] is safe to call from hard interrupt context: it
//! reads and acknowledges CSR5, bumps counters and records what needs to
//! be done in the [`PendingWork`] word. Everything that walks a ring runs
//! later, from [`Stmmac::run_pending`] or the caller's own executor.

use bitflags::bitflags;
use core::sync::atomic::Ordering;

use super::common::{DmaStatus, dma, dma_start_tx, dma_stop_tx};
use super::config::MsgLevel;
use super::hal::{RegisterIo, StmmacHal};
use super::tx::TxQueue;
use super::{DeviceState, Stmmac};
use crate::drivers::net::netdev::{PacketSink, bump};

bitflags! {
    /// Work scheduled by the interrupt handler
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PendingWork: u32 {
        /// Receive poll; the receive interrupt stays masked until it completes
        const RX_POLL = 1 << 0;
        /// Transmit reclaim
        const TX_CLEAN = 1 << 1;
        /// Transmit recovery that could not take the queue lock in the handler
        const TX_RESET = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    Handled,
    /// Not ours (shared line, or the device is down)
    None,
}

impl<R: RegisterIo, H: StmmacHal> Stmmac<R, H> {
    /// Top half.
    pub fn interrupt(&self) -> IrqReturn {
        if self.state() != DeviceState::Open {
            return IrqReturn::None;
        }

        if self.is_gmac {
            self.ops.host_irq_status(&self.regs, &self.xstats);
        }
        self.dma_interrupt()
    }

    fn dma_interrupt(&self) -> IrqReturn {
        let raw = self.regs.read(dma::STATUS);
        if raw == 0 {
            return IrqReturn::None;
        }
        let status = DmaStatus::from_bits_retain(raw);

        if self.msg_level().contains(MsgLevel::INTR) {
            log::debug!("[STMMAC] CSR5 {:#010x}", raw);
        }

        // Clear the interrupt by writing a logic 1 to CSR5[16:0]
        self.regs.write(dma::STATUS, raw & dma::STATUS_W1C_MASK);

        if status.contains(DmaStatus::AIS) {
            self.abnormal_interrupt(status);
        }

        if status.contains(DmaStatus::NIS) {
            bump(&self.xstats.normal_irq_n);
            if status.contains(DmaStatus::RI) {
                bump(&self.xstats.dma_rx_normal_irq);
                self.schedule_rx();
            }
            if status.contains(DmaStatus::TI) {
                bump(&self.xstats.dma_tx_normal_irq);
                self.schedule(PendingWork::TX_CLEAN);
            }
        }

        // Optional hardware blocks, interrupts should be disabled
        if status.intersects(DmaStatus::GPI | DmaStatus::GMI | DmaStatus::GLI) {
            log::info!("[STMMAC] unexpected status {:#010x}", raw);
        }

        IrqReturn::Handled
    }

    fn abnormal_interrupt(&self, status: DmaStatus) {
        let x = &self.xstats;

        if status.contains(DmaStatus::UNF) {
            log::debug!("[STMMAC] transmit underflow");
            let threshold = self.threshold();
            if threshold != dma::SF_DMA_MODE && threshold <= 256 {
                // Try to bump up the threshold
                let threshold = threshold + 64;
                x.threshold.store(threshold as u64, Ordering::Relaxed);
                self.ops.dma_mode(&self.regs, threshold, dma::SF_DMA_MODE);
            }
            self.tx_err_from_irq();
            bump(&x.tx_undeflow_irq);
        }
        if status.contains(DmaStatus::TJT) {
            log::debug!("[STMMAC] transmit jabber");
            bump(&x.tx_jabber_irq);
        }
        if status.contains(DmaStatus::OVF) {
            log::debug!("[STMMAC] receive overflow");
            bump(&x.rx_overflow_irq);
        }
        if status.contains(DmaStatus::RU) {
            log::debug!("[STMMAC] receive buffer unavailable");
            bump(&x.rx_buf_unav_irq);
        }
        if status.contains(DmaStatus::RPS) {
            log::debug!("[STMMAC] receive process stopped");
            bump(&x.rx_process_stopped_irq);
        }
        if status.contains(DmaStatus::RWT) {
            log::debug!("[STMMAC] receive watchdog");
            bump(&x.rx_watchdog_irq);
        }
        if status.contains(DmaStatus::ETI) {
            log::debug!("[STMMAC] transmit early interrupt");
            bump(&x.tx_early_irq);
        }
        if status.contains(DmaStatus::TPS) {
            log::debug!("[STMMAC] transmit process stopped");
            bump(&x.tx_process_stopped_irq);
            self.tx_err_from_irq();
        }
        if status.contains(DmaStatus::FBI) {
            log::error!("[STMMAC] fatal bus error");
            bump(&x.fatal_bus_error_irq);
            self.tx_err_from_irq();
        }
    }

    fn schedule(&self, work: PendingWork) {
        self.pending.fetch_or(work.bits(), Ordering::AcqRel);
    }

    /// Mask the receive interrupt and schedule a poll.
    pub(super) fn schedule_rx(&self) {
        if self.napi_enabled.load(Ordering::Acquire) {
            self.disable_rx_irq();
            self.schedule(PendingWork::RX_POLL);
        }
    }

    /// Claim all scheduled work. The caller must run it.
    pub fn take_pending_work(&self) -> PendingWork {
        PendingWork::from_bits_truncate(self.pending.swap(0, Ordering::AcqRel))
    }

    pub fn pending_work(&self) -> PendingWork {
        PendingWork::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }

    /// Bottom half: run whatever the interrupt handler scheduled. Returns
    /// the number of frames delivered to `sink`.
    pub fn run_pending(&self, budget: usize, sink: &mut dyn PacketSink) -> usize {
        let work = self.take_pending_work();

        if work.contains(PendingWork::TX_RESET) {
            self.tx_err();
        }
        if work.contains(PendingWork::TX_CLEAN) {
            self.tx_tasklet();
        }
        if work.contains(PendingWork::RX_POLL) {
            self.poll(budget, sink)
        } else {
            0
        }
    }

    /// Deferred transmit reclaim
    pub fn tx_tasklet(&self) {
        if !self.tasklet_enabled.load(Ordering::Acquire) {
            return;
        }
        bump(&self.xstats.tx_task_n);
        self.tx_clean();
        self.timer_start();
    }

    /// Transmit error recovery: stop the transmitter, drop everything
    /// queued, reset the ring and start again from entry 0.
    pub fn tx_err(&self) {
        let mut guard = self.tx.lock();
        if let Some(q) = guard.as_mut() {
            self.tx_reset_locked(q);
        }
    }

    fn tx_err_from_irq(&self) {
        match self.tx.try_lock() {
            Some(mut guard) => {
                if let Some(q) = guard.as_mut() {
                    self.tx_reset_locked(q);
                }
            }
            None => self.schedule(PendingWork::TX_RESET),
        }
    }

    fn tx_reset_locked(&self, q: &mut TxQueue) {
        self.stop_queue();

        dma_stop_tx(&self.regs);
        q.reset(self.ops, &self.hal);
        // the DMA restarts from the list base, not where it stopped
        self.regs.write(dma::TX_BASE_ADDR, q.ring.bus_addr());
        dma_start_tx(&self.regs);

        bump(&self.stats.tx_errors);
        self.wake_queue();
    }

    /// Mitigation timer expiry: look for work without waiting for an
    /// interrupt. The timer is stopped when work was found; completion of
    /// that work restarts it.
    pub fn timer_work(&self) {
        if self.state() != DeviceState::Open {
            return;
        }
        let ops = self.ops;

        let rx_ready = self.rx.try_lock().is_some_and(|guard| {
            guard
                .as_ref()
                .is_some_and(|q| !ops.get_rx_owner(q.ring.desc(q.ring.entry(q.ring.cur))))
        });
        let tx_ready = self.tx.try_lock().is_some_and(|guard| {
            guard.as_ref().is_some_and(|q| {
                q.ring.in_flight() > 0 && !ops.get_tx_owner(q.ring.desc(q.ring.entry(q.ring.dirty)))
            })
        });

        if rx_ready {
            self.schedule_rx();
        }
        if tx_ready {
            self.schedule(PendingWork::TX_CLEAN);
        }
        if rx_ready || tx_ready {
            bump(&self.xstats.sched_timer_n);
            self.hal.timer_stop();
        }
    }

    /// Service the device with interrupts disabled (diagnostic consoles).
    pub fn poll_controller(&self, budget: usize, sink: &mut dyn PacketSink) -> usize {
        bump(&self.xstats.poll_n);
        self.interrupt();
        self.run_pending(budget, sink)
    }
}
