//! STMicroelectronics / Synopsys 10/100/1000 Ethernet MAC driver
//!
//! Supports the two generations of the core found on ST SoCs:
//!
//! - **MAC100**: 10/100 MAC with "normal" DMA descriptors
//! - **GMAC**: 10/100/1000 MAC with "enhanced" descriptors, checksum
//!   offload, jumbo frames and a power management block
//!
//! # Architecture
//!
//! ```text
//!            start_xmit            poll / run_pending           interrupt
//!                │                        │                        │
//!          ┌─────▼─────┐           ┌──────▼──────┐          ┌──────▼──────┐
//!          │  tx.rs    │◄──────────┤  irq.rs     │◄─────────┤ DMA status  │
//!          │ TxQueue   │ tx_clean  │ PendingWork │  RX_POLL │   (CSR5)    │
//!          └─────┬─────┘           └──────┬──────┘ TX_CLEAN └─────────────┘
//!                │                        │
//!          ┌─────▼─────┐           ┌──────▼──────┐
//!          │ DescRing  │           │  rx.rs      │
//!          │ (ring.rs) │           │ RxQueue     │
//!          └─────┬─────┘           └──────┬──────┘
//!                └──────────┬─────────────┘
//!                    ┌──────▼──────┐
//!                    │   MacOps    │  mac100.rs + norm_desc.rs
//!                    │  DescOps    │  gmac.rs   + enh_desc.rs
//!                    └─────────────┘
//! ```
//!
//! The interrupt handler only reads and acknowledges the status register,
//! counts abnormal events and records deferred work as bits in an atomic
//! word. The caller's executor picks the work up with
//! [`Stmmac::take_pending_work`] or simply calls [`Stmmac::run_pending`].
//!
//! # Locking
//!
//! Three `spin::Mutex`es, always taken in this order: device state
//! (`core`), transmit queue, receive queue. The interrupt handler only ever
//! `try_lock`s the transmit queue and defers the recovery when it is busy.
//!
//! # Usage
//!
//! ```ignore
//! let regs = unsafe { Mmio::new(STMMAC_BASE) };
//! let dev = Stmmac::attach(regs, board_hal, plat, "debug:16,watchdog:4000".parse()?)?;
//! dev.open()?;
//!
//! // in the interrupt handler
//! dev.interrupt();
//!
//! // in the network task
//! dev.run_pending(64, &mut rx_queue);
//! ```

pub mod common;
pub mod config;
pub mod descs;
pub mod gmac;
pub mod hal;
pub mod mac100;
pub mod stats;

mod enh_desc;
mod irq;
mod link;
mod norm_desc;
mod pm;
mod ring;
mod rx;
mod tx;

#[cfg(test)]
mod testing;

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use spin::Mutex;

use self::common::{
    DmaIntr, Duplex, HwCap, MMC_HIGH_INTR_MASK, MMC_LOW_INTR_MASK, MacOps, WolOpts,
    buf_size_for_mtu, dma, dma_start_rx, dma_start_tx, dma_stop_rx, dma_stop_tx,
    mac_disable_rx, mac_disable_tx, mac_enable_rx, mac_enable_tx,
};
use self::config::{MsgLevel, align_ring_size};
use self::gmac::{GMAC_OPS, Gmac};
use self::mac100::MAC100_OPS;
use self::rx::RxQueue;
use self::stats::{StmmacExtraCounters, StmmacExtraStats};
use self::tx::TxQueue;
use crate::drivers::net::netdev::{
    NetDeviceCounters, NetDeviceStats, NetworkDevice, NetworkError, PacketSink, Result, RxFilter,
    TxOutcome,
};
use crate::net::ethernet::{ETH_DATA_LEN, ETH_MIN_MTU, MacAddress};
use crate::net::skbuff::SkBuff;

pub use self::config::Config;
pub use self::hal::{BusAddr, DmaDirection, Mmio, RegisterIo, StmmacHal};
pub use self::irq::{IrqReturn, PendingWork};
pub use self::link::PhyState;
pub use self::pm::PmEvent;

/// Board description handed over at attach
#[derive(Debug, Clone, Copy)]
pub struct PlatformData {
    pub bus_id: i32,
    /// DMA programmable burst length
    pub pbl: u32,
    /// GMAC core (enhanced descriptors) rather than MAC100
    pub has_gmac: bool,
    /// MDIO address of the PHY, -1 to scan the bus
    pub phy_addr: i32,
    pub irq: u32,
    /// Dedicated PHY interrupt; `None` polls the PHY
    pub phy_irq: Option<u32>,
    /// Board hook to retune clocks when the link speed changes
    pub fix_mac_speed: Option<fn(u32)>,
}

impl Default for PlatformData {
    fn default() -> Self {
        Self {
            bus_id: 0,
            pbl: 8,
            has_gmac: false,
            phy_addr: -1,
            irq: 0,
            phy_irq: None,
            fix_mac_speed: None,
        }
    }
}

/// PHY collaborator. The PHY state machine lives outside the driver and
/// reports link changes through [`Stmmac::adjust_link`].
pub trait Phy: Send {
    fn phy_id(&self) -> u32;

    fn start(&mut self);

    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceState {
    Closed = 0,
    Open = 1,
    Suspended = 2,
    /// `open` owns the device until it either succeeds or rolls back
    Opening = 3,
}

impl DeviceState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Open,
            2 => Self::Suspended,
            3 => Self::Opening,
            _ => Self::Closed,
        }
    }
}

/// State guarded by the device lock
struct CoreState {
    dev_addr: MacAddress,
    config: Config,
    /// Flow control mode requested from the MAC on link up
    flow_ctrl: u32,
    pause: u32,
    oldlink: bool,
    speed: u32,
    oldduplex: Option<Duplex>,
    wol_opts: WolOpts,
    wol_enabled: bool,
    /// Suspended through a full release; resume reopens
    shutdown: bool,
    filter: RxFilter,
}

pub struct Stmmac<R: RegisterIo, H: StmmacHal> {
    regs: R,
    hal: H,
    ops: &'static dyn MacOps,
    plat: PlatformData,
    is_gmac: bool,
    hw: HwCap,
    /// The core verifies receive checksums
    rx_csum: bool,

    core: Mutex<CoreState>,
    tx: Mutex<Option<TxQueue>>,
    rx: Mutex<Option<RxQueue>>,
    phy: Mutex<Option<Box<dyn Phy>>>,

    state: AtomicU8,
    queue_stopped: AtomicBool,
    napi_enabled: AtomicBool,
    tasklet_enabled: AtomicBool,
    carrier: AtomicBool,
    full_duplex: AtomicBool,
    tx_coe: AtomicBool,
    pending: AtomicU32,
    mtu: AtomicUsize,
    tmrate: AtomicU32,
    msg_level: AtomicU32,
    /// Time of the last submission or reclaim, for the watchdog
    trans_start: AtomicU64,

    stats: NetDeviceCounters,
    xstats: StmmacExtraCounters,
}

impl<R: RegisterIo, H: StmmacHal> Stmmac<R, H> {
    /// Probe the core and build the device. Nothing is allocated and the
    /// DMA is left untouched until [`open`](Self::open).
    pub fn attach(regs: R, hal: H, plat: PlatformData, config: Config) -> Result<Self> {
        let ops: &'static dyn MacOps = if plat.has_gmac {
            &GMAC_OPS
        } else {
            &MAC100_OPS
        };
        Self::with_ops(regs, hal, plat, config, ops)
    }

    /// Attach with an explicit ops table, for platform glue that wraps one
    /// of the stock tables.
    pub fn with_ops(
        regs: R,
        hal: H,
        mut plat: PlatformData,
        mut config: Config,
        ops: &'static dyn MacOps,
    ) -> Result<Self> {
        config.verify_args();

        let is_gmac = plat.has_gmac;
        if is_gmac {
            let version = Gmac::version(&regs);
            log::info!("[STMMAC] GMAC - user ID: {:#x}, Synopsys ID: {:#x}", (version >> 8) & 0xff, version & 0xff);
        } else {
            log::info!("[STMMAC] MAC100 10/100 Ethernet");
        }

        let hw = ops.hw_cap();
        let dev_addr = ops.get_umac_addr(&regs, 0);
        config.init_coalescence(is_gmac, ETH_DATA_LEN);

        if (0..=31).contains(&config.phyaddr) {
            plat.phy_addr = config.phyaddr;
        }

        log::info!(
            "[STMMAC] {} attached on bus {}: MAC {}, PHY {}, irq {}",
            ops.name(),
            plat.bus_id,
            dev_addr,
            plat.phy_addr,
            plat.irq
        );
        log::debug!("[STMMAC] tunables: {:?}", config);

        let core = CoreState {
            dev_addr,
            flow_ctrl: config.flow_mode(),
            pause: config.pause as u32,
            oldlink: false,
            speed: 0,
            oldduplex: None,
            wol_opts: WolOpts::empty(),
            wol_enabled: hw.pmt,
            shutdown: false,
            filter: RxFilter::default(),
            config,
        };
        let msg_level = core.config.msg_level().bits();
        let tmrate = core.config.tmrate as u32;

        Ok(Self {
            regs,
            hal,
            ops,
            plat,
            is_gmac,
            hw,
            rx_csum: is_gmac,
            core: Mutex::new(core),
            tx: Mutex::new(None),
            rx: Mutex::new(None),
            phy: Mutex::new(None),
            state: AtomicU8::new(DeviceState::Closed as u8),
            queue_stopped: AtomicBool::new(true),
            napi_enabled: AtomicBool::new(false),
            tasklet_enabled: AtomicBool::new(false),
            carrier: AtomicBool::new(false),
            full_duplex: AtomicBool::new(true),
            tx_coe: AtomicBool::new(false),
            pending: AtomicU32::new(0),
            mtu: AtomicUsize::new(ETH_DATA_LEN),
            tmrate: AtomicU32::new(tmrate),
            msg_level: AtomicU32::new(msg_level),
            trans_start: AtomicU64::new(0),
            stats: NetDeviceCounters::default(),
            xstats: StmmacExtraCounters::default(),
        })
    }

    /// Hand the PHY over to the driver; started and stopped with the device.
    pub fn attach_phy(&self, phy: Box<dyn Phy>) {
        *self.phy.lock() = Some(phy);
    }

    /// Bring the interface up.
    ///
    /// Either everything (rings, buffers, DMA) is set up or nothing is left
    /// allocated and the device stays closed.
    pub fn open(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                DeviceState::Closed as u8,
                DeviceState::Opening as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(NetworkError::Busy);
        }

        if let Err(e) = self.bring_up() {
            self.state.store(DeviceState::Closed as u8, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    fn bring_up(&self) -> Result<()> {
        let (config, dev_addr, filter) = {
            let mut core = self.core.lock();
            if !core.dev_addr.is_valid() {
                core.dev_addr = MacAddress::random(self.hal.random_seed());
                log::warn!("[STMMAC] invalid MAC address; using random {}", core.dev_addr);
            }
            core.config.verify_args();
            self.msg_level.store(core.config.msg_level().bits(), Ordering::Relaxed);
            self.tmrate.store(core.config.tmrate as u32, Ordering::Relaxed);
            (core.config.clone(), core.dev_addr, core.filter.clone())
        };

        self.init_phy()?;

        let mtu = self.mtu();
        let txsize = align_ring_size(config.dma_txsize);
        let rxsize = align_ring_size(config.dma_rxsize);
        let buf_sz = (config.buf_sz as usize).max(buf_size_for_mtu(mtu));
        log::debug!("[STMMAC] txsize {}, rxsize {}, bfsize {}", txsize, rxsize, buf_sz);

        let tx = TxQueue::new(&self.hal, self.ops, txsize, config.tx_coalesce)?;
        let rx = RxQueue::new(&self.hal, self.ops, rxsize, buf_sz, config.rx_coalesce)?;
        let (tx_bus, rx_bus) = (tx.ring.bus_addr(), rx.ring.bus_addr());
        if self.msg_level().contains(MsgLevel::HW) {
            rx.ring.dump("RX");
            tx.ring.dump("TX");
        }
        *self.tx.lock() = Some(tx);
        *self.rx.lock() = Some(rx);

        if let Err(e) = self.ops.dma_init(&self.regs, self.plat.pbl, tx_bus, rx_bus) {
            log::error!("[STMMAC] DMA initialization failed: {}", e);
            self.free_queues();
            return Err(e);
        }

        self.ops.set_umac_addr(&self.regs, &dev_addr, 0);
        self.ops.core_init(&self.regs);
        self.ops.set_filter(&self.regs, &filter);

        self.regs.write(MMC_HIGH_INTR_MASK, 0xffff_ffff);
        self.regs.write(MMC_LOW_INTR_MASK, 0xffff_ffff);

        mac_enable_rx(&self.regs);
        mac_enable_tx(&self.regs);

        self.xstats.reset();

        // MAC100 has no checksum engine; GMAC only inserts checksums in
        // store-and-forward mode, which needs the whole frame in the FIFO.
        let coe = self.is_gmac && config.tx_coe && mtu <= ETH_DATA_LEN;
        let threshold = if coe {
            self.ops.dma_mode(&self.regs, dma::SF_DMA_MODE, dma::SF_DMA_MODE);
            dma::SF_DMA_MODE
        } else {
            let tc = config.tc as u32;
            self.ops.dma_mode(&self.regs, tc, dma::SF_DMA_MODE);
            tc
        };
        self.xstats.threshold.store(threshold as u64, Ordering::Relaxed);
        self.tx_coe.store(coe, Ordering::Relaxed);

        dma_start_tx(&self.regs);
        dma_start_rx(&self.regs);

        if self.msg_level().contains(MsgLevel::HW) {
            self.ops.dump_mac_regs(&self.regs);
            self.ops.dump_dma_regs(&self.regs);
        }

        self.pending.store(0, Ordering::Release);
        self.napi_enabled.store(true, Ordering::Release);
        self.tasklet_enabled.store(true, Ordering::Release);
        self.trans_start.store(self.hal.now_ms(), Ordering::Relaxed);
        self.state.store(DeviceState::Open as u8, Ordering::Release);

        self.timer_start();
        if let Some(phy) = self.phy.lock().as_mut() {
            phy.start();
        }
        self.queue_stopped.store(false, Ordering::Release);

        log::info!(
            "[STMMAC] {} up: MAC {}, mtu {}, {} checksum insertion",
            self.ops.name(),
            dev_addr,
            mtu,
            if coe { "hardware" } else { "software" }
        );
        Ok(())
    }

    /// Take the interface down and free every ring and buffer.
    pub fn release(&self) {
        if matches!(self.state(), DeviceState::Closed | DeviceState::Opening) {
            return;
        }

        if let Some(phy) = self.phy.lock().as_mut() {
            phy.stop();
        }

        self.queue_stopped.store(true, Ordering::Release);
        self.tasklet_enabled.store(false, Ordering::Release);
        self.napi_enabled.store(false, Ordering::Release);
        self.pending.store(0, Ordering::Release);
        self.hal.timer_stop();

        dma_stop_tx(&self.regs);
        dma_stop_rx(&self.regs);

        self.free_queues();

        mac_disable_tx(&self.regs);
        mac_disable_rx(&self.regs);

        self.carrier.store(false, Ordering::Release);
        self.state.store(DeviceState::Closed as u8, Ordering::Release);
        log::info!("[STMMAC] {} down", self.ops.name());
    }

    /// Unmap and free every buffer, then the rings themselves.
    fn free_queues(&self) {
        if let Some(mut tx) = self.tx.lock().take() {
            tx.free_all(self.ops, &self.hal);
        }
        if let Some(mut rx) = self.rx.lock().take() {
            rx.free_all(&self.hal);
        }
    }

    /// Stop the hardware for good and give the register window and the
    /// HAL back.
    pub fn detach(self) -> (R, H) {
        self.release();
        log::info!("[STMMAC] {} removed", self.ops.name());

        let Self { regs, hal, .. } = self;
        (regs, hal)
    }

    pub fn change_mtu(&self, mtu: usize) -> Result<()> {
        if self.state() != DeviceState::Closed {
            log::error!("[STMMAC] must be stopped to change its MTU");
            return Err(NetworkError::Busy);
        }
        if !(ETH_MIN_MTU..=self.ops.max_mtu()).contains(&mtu) {
            log::error!("[STMMAC] invalid MTU {} (max {})", mtu, self.ops.max_mtu());
            return Err(NetworkError::InvalidMtu);
        }
        self.mtu.store(mtu, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_mac_address(&self, addr: MacAddress) -> Result<()> {
        if self.state() != DeviceState::Closed {
            return Err(NetworkError::Busy);
        }
        if !addr.is_valid() {
            return Err(NetworkError::InvalidMacAddress);
        }
        self.core.lock().dev_addr = addr;
        Ok(())
    }

    /// Program the receive filter; kept and reapplied on every open.
    pub fn set_rx_mode(&self, filter: &RxFilter) {
        let mut core = self.core.lock();
        core.filter = filter.clone();
        self.ops.set_filter(&self.regs, &core.filter);
    }

    /// Replace the tunables. Checked strictly; applied at the next open.
    pub fn set_config(&self, config: Config) -> Result<()> {
        config.validate()?;
        let mut core = self.core.lock();
        core.flow_ctrl = config.flow_mode();
        core.pause = config.pause as u32;
        core.config = config;
        Ok(())
    }

    pub fn config(&self) -> Config {
        self.core.lock().config.clone()
    }

    /// Select the wake-up sources armed on suspend.
    pub fn set_wol(&self, opts: WolOpts) -> Result<()> {
        let mut core = self.core.lock();
        if !core.wol_enabled && !opts.is_empty() {
            log::warn!("[STMMAC] wake-on-LAN not supported by {}", self.ops.name());
            return Err(NetworkError::InvalidConfiguration);
        }
        core.wol_opts = opts;
        Ok(())
    }

    pub fn wol(&self) -> WolOpts {
        self.core.lock().wol_opts
    }

    /// Interface counters; folds in the hardware missed-frame counter.
    pub fn stats(&self) -> NetDeviceStats {
        if self.state() == DeviceState::Open {
            self.ops.dma_diagnostic_fr(&self.regs, &self.stats, &self.xstats);
        }
        self.stats.snapshot()
    }

    pub fn extra_stats(&self) -> StmmacExtraStats {
        self.xstats.snapshot()
    }

    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn mtu(&self) -> usize {
        self.mtu.load(Ordering::Relaxed)
    }

    pub fn mac_address(&self) -> MacAddress {
        self.core.lock().dev_addr
    }

    pub fn is_gmac(&self) -> bool {
        self.is_gmac
    }

    pub fn hw_cap(&self) -> HwCap {
        self.hw
    }

    pub fn rx_csum(&self) -> bool {
        self.rx_csum
    }

    /// Hardware checksum insertion in use
    pub fn tx_coe(&self) -> bool {
        self.tx_coe.load(Ordering::Relaxed)
    }

    /// Current transmit FIFO threshold, `SF_DMA_MODE` for store-and-forward
    pub fn threshold(&self) -> u32 {
        self.xstats.threshold.load(Ordering::Relaxed) as u32
    }

    pub fn platform(&self) -> &PlatformData {
        &self.plat
    }

    pub fn queue_stopped(&self) -> bool {
        self.queue_stopped.load(Ordering::Acquire)
    }

    pub fn carrier_ok(&self) -> bool {
        self.carrier.load(Ordering::Acquire)
    }

    pub fn msg_level(&self) -> MsgLevel {
        MsgLevel::from_bits_truncate(self.msg_level.load(Ordering::Relaxed))
    }

    fn timer_start(&self) {
        let rate = self.tmrate.load(Ordering::Relaxed);
        if rate > 0 {
            self.hal.timer_start(rate);
        }
    }

    fn stop_queue(&self) {
        self.queue_stopped.store(true, Ordering::Release);
    }

    fn wake_queue(&self) {
        self.queue_stopped.store(false, Ordering::Release);
    }

    fn enable_rx_irq(&self) {
        self.regs.write(dma::INTR_ENA, DmaIntr::DEFAULT_MASK.bits());
    }

    fn disable_rx_irq(&self) {
        self.regs.write(dma::INTR_ENA, DmaIntr::NO_RX.bits());
    }
}

impl<R: RegisterIo, H: StmmacHal> NetworkDevice for Stmmac<R, H> {
    fn open(&self) -> Result<()> {
        Stmmac::open(self)
    }

    fn stop(&self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn start_xmit(&self, skb: SkBuff) -> Result<TxOutcome> {
        self.transmit(skb)
    }

    fn can_transmit(&self) -> bool {
        self.state() == DeviceState::Open && !self.queue_stopped()
    }

    /// Reclaim finished transmissions, then receive. Callers that drive
    /// the device without interrupts get both directions serviced here.
    fn poll(&self, budget: usize, sink: &mut dyn PacketSink) -> usize {
        self.tx_clean();
        Stmmac::poll(self, budget, sink)
    }

    fn mac_address(&self) -> MacAddress {
        Stmmac::mac_address(self)
    }

    fn mtu(&self) -> usize {
        Stmmac::mtu(self)
    }

    fn change_mtu(&self, mtu: usize) -> Result<()> {
        Stmmac::change_mtu(self, mtu)
    }

    fn set_rx_mode(&self, filter: &RxFilter) {
        Stmmac::set_rx_mode(self, filter)
    }

    fn stats(&self) -> NetDeviceStats {
        Stmmac::stats(self)
    }

    fn link_up(&self) -> bool {
        self.carrier_ok()
    }
}
