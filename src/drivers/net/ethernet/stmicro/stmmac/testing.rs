//! Host-side stand-ins for the hardware
//!
//! [`FakeRegs`] is a register file with the two behaviors the driver relies
//! on: the DMA software reset clears itself and CSR5 is write-1-to-clear.
//! It also tracks where the DMA engine is in each ring. [`FakeHal`] hands
//! out bus addresses for host memory so the fake DMA can read transmitted
//! frames and write received ones. The `hw_*` helpers play the DMA engine.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use spin::Mutex;

use super::common::{DescOps, DmaStatus, Duplex, HwCap, MacOps, RxFrameStatus, TxFrameStatus, WolOpts, dma};
use super::descs::{DmaDesc, RDES0_FL_SHIFT, norm};
use super::gmac::{gmac_addr_high, gmac_addr_low};
use super::hal::{BusAddr, DmaDirection, RegisterIo, StmmacHal};
use super::mac100::{MAC_ADDR_HIGH, MAC_ADDR_LOW};
use super::stats::StmmacExtraCounters;
use super::{PlatformData, Stmmac};
use crate::drivers::net::netdev::{NetDeviceCounters, Result, RxFilter};
use crate::net::ethernet::{ETH_FCS_LEN, MacAddress};
use crate::net::skbuff::SkBuff;

pub const TEST_MAC: MacAddress = MacAddress::new([0x00, 0x80, 0xe1, 0x12, 0x34, 0x56]);

// ============================================================================
// Register file
// ============================================================================

#[derive(Default)]
struct RegState {
    values: BTreeMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    /// Next descriptor the DMA engine will use, per ring
    tx_pos: usize,
    rx_pos: usize,
}

#[derive(Default)]
pub struct FakeRegs {
    state: Mutex<RegState>,
    /// Keep BUS_MODE.SFT_RESET set forever
    stuck_reset: AtomicBool,
}

impl FakeRegs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers as they read after reset, with `mac` in address register 0
    pub fn with_mac(mac: MacAddress, gmac: bool) -> Self {
        let regs = Self::new();
        let a = mac.as_bytes();
        let (high, low) = if gmac {
            (gmac_addr_high(0), gmac_addr_low(0))
        } else {
            (MAC_ADDR_HIGH, MAC_ADDR_LOW)
        };
        regs.poke(high, ((a[5] as u32) << 8) | a[4] as u32);
        regs.poke(low, u32::from_le_bytes([a[0], a[1], a[2], a[3]]));
        regs
    }

    /// Set a register without going through the driver-visible path
    pub fn poke(&self, offset: usize, value: u32) {
        self.state.lock().values.insert(offset, value);
    }

    pub fn peek(&self, offset: usize) -> u32 {
        self.state.lock().values.get(&offset).copied().unwrap_or(0)
    }

    /// Latch interrupt status bits as the DMA would
    pub fn raise(&self, status: DmaStatus) {
        let mut s = self.state.lock();
        *s.values.entry(dma::STATUS).or_insert(0) |= status.bits();
    }

    pub fn writes_to(&self, offset: usize) -> Vec<u32> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_write_log(&self) {
        self.state.lock().writes.clear();
    }

    pub fn set_stuck_reset(&self, stuck: bool) {
        self.stuck_reset.store(stuck, Ordering::Relaxed);
    }

    pub fn rx_pos(&self) -> usize {
        self.state.lock().rx_pos
    }

    pub fn tx_pos(&self) -> usize {
        self.state.lock().tx_pos
    }

    /// Move the fake DMA's transmit pointer, as if it had been running
    pub fn set_tx_pos(&self, pos: usize) {
        self.state.lock().tx_pos = pos;
    }

    fn advance_rx(&self) {
        self.state.lock().rx_pos += 1;
    }

    fn advance_tx(&self, n: usize) {
        self.state.lock().tx_pos += n;
    }
}

impl RegisterIo for FakeRegs {
    fn read(&self, offset: usize) -> u32 {
        self.peek(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        let mut s = self.state.lock();
        s.writes.push((offset, value));
        match offset {
            dma::STATUS => {
                let cur = s.values.entry(offset).or_insert(0);
                *cur &= !(value & dma::STATUS_W1C_MASK);
            }
            dma::BUS_MODE if !self.stuck_reset.load(Ordering::Relaxed) => {
                s.values.insert(offset, value & !dma::BUS_MODE_SFT_RESET);
            }
            dma::TX_BASE_ADDR => {
                s.tx_pos = 0;
                s.values.insert(offset, value);
            }
            dma::RCV_BASE_ADDR => {
                s.rx_pos = 0;
                s.values.insert(offset, value);
            }
            _ => {
                s.values.insert(offset, value);
            }
        }
    }
}

// ============================================================================
// Platform
// ============================================================================

struct Mapping {
    vaddr: usize,
    len: usize,
    dir: DmaDirection,
}

#[derive(Default)]
struct HalState {
    next_bus: u32,
    maps: BTreeMap<BusAddr, Mapping>,
    coherent: BTreeMap<usize, BusAddr>,
    /// Allocations left before `alloc_rx_buffer` starts failing
    alloc_budget: Option<usize>,
}

#[derive(Default)]
pub struct FakeHal {
    state: Mutex<HalState>,
    pub bad_unmaps: AtomicUsize,
    pub now: AtomicU64,
    pub may_wakeup: AtomicBool,
    pub timer_running: AtomicBool,
    pub timer_starts: AtomicUsize,
}

const BUS_BASE: BusAddr = 0x1000_0000;
const COHERENT_BASE: BusAddr = 0x8000_0000;
const PAGE: u32 = 4096;
/// Gap after every mapping so `buf1 + 4K/8K` never lands in a neighbor
const GUARD: u32 = 16 * 1024;

impl FakeHal {
    pub fn new() -> Self {
        let hal = Self::default();
        hal.state.lock().next_bus = BUS_BASE;
        hal
    }

    /// `None` removes the limit
    pub fn set_alloc_budget(&self, budget: Option<usize>) {
        self.state.lock().alloc_budget = budget;
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn live_mappings(&self) -> usize {
        self.state.lock().maps.len()
    }

    pub fn is_mapped(&self, bus: BusAddr) -> bool {
        self.state.lock().maps.contains_key(&bus)
    }

    /// Copy `len` bytes out of a streaming mapping, as the DMA reads them
    pub fn read_bus(&self, bus: BusAddr, len: usize) -> Vec<u8> {
        let s = self.state.lock();
        let m = s.maps.get(&bus).expect("read from unmapped bus address");
        assert_eq!(m.dir, DmaDirection::ToDevice);
        assert!(len <= m.len);
        // SAFETY: the mapping covers `len` bytes of a live buffer
        unsafe { core::slice::from_raw_parts(m.vaddr as *const u8, len).to_vec() }
    }

    /// Copy `data` into a receive mapping, as the DMA writes a frame
    pub fn write_bus(&self, bus: BusAddr, data: &[u8]) {
        let s = self.state.lock();
        let m = s.maps.get(&bus).expect("write to unmapped bus address");
        assert_eq!(m.dir, DmaDirection::FromDevice);
        assert!(data.len() <= m.len);
        // SAFETY: the mapping covers the buffer and the driver does not
        // touch it until the descriptor comes back
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), m.vaddr as *mut u8, data.len()) }
    }
}

impl StmmacHal for FakeHal {
    fn virt_to_bus(&self, vaddr: *const u8) -> BusAddr {
        let mut s = self.state.lock();
        let next = COHERENT_BASE + (s.coherent.len() as u32) * 0x10_0000;
        *s.coherent.entry(vaddr as usize).or_insert(next)
    }

    fn dma_map(&self, vaddr: *const u8, len: usize, dir: DmaDirection) -> BusAddr {
        let mut s = self.state.lock();
        let bus = s.next_bus;
        s.next_bus += (len as u32).div_ceil(PAGE) * PAGE + GUARD;
        s.maps.insert(
            bus,
            Mapping {
                vaddr: vaddr as usize,
                len,
                dir,
            },
        );
        bus
    }

    fn dma_unmap(&self, bus: BusAddr, len: usize, dir: DmaDirection) {
        let mut s = self.state.lock();
        match s.maps.get(&bus) {
            Some(m) if m.len == len && m.dir == dir => {
                s.maps.remove(&bus);
            }
            _ => {
                self.bad_unmaps.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn alloc_rx_buffer(&self, size: usize) -> Option<SkBuff> {
        {
            let mut s = self.state.lock();
            if let Some(left) = s.alloc_budget.as_mut() {
                if *left == 0 {
                    return None;
                }
                *left -= 1;
            }
        }
        SkBuff::alloc(size).ok()
    }

    fn delay_us(&self, _us: u32) {}

    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    fn random_seed(&self) -> u64 {
        0x5eed
    }

    fn timer_start(&self, _rate_hz: u32) {
        self.timer_running.store(true, Ordering::Relaxed);
        self.timer_starts.fetch_add(1, Ordering::Relaxed);
    }

    fn timer_stop(&self) {
        self.timer_running.store(false, Ordering::Relaxed);
    }

    fn device_may_wakeup(&self) -> bool {
        self.may_wakeup.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Devices and the fake DMA engine
// ============================================================================

pub type TestDev = Stmmac<FakeRegs, FakeHal>;

pub fn platform(gmac: bool) -> PlatformData {
    PlatformData {
        has_gmac: gmac,
        ..PlatformData::default()
    }
}

pub fn attach(gmac: bool, config: super::Config) -> TestDev {
    Stmmac::attach(FakeRegs::with_mac(TEST_MAC, gmac), FakeHal::new(), platform(gmac), config).unwrap()
}

pub fn open_dev(gmac: bool) -> TestDev {
    let dev = attach(gmac, super::Config::default());
    dev.open().unwrap();
    dev
}

/// A minimal Ethernet frame of `len` bytes, IPv4 ethertype, filled with `fill`
pub fn frame(len: usize, fill: u8) -> Vec<u8> {
    let mut f = alloc::vec![fill; len];
    f[..6].copy_from_slice(&[0xff; 6]);
    f[6..12].copy_from_slice(TEST_MAC.as_bytes());
    f[12] = 0x08;
    f[13] = 0x00;
    f
}

pub fn skb(len: usize, fill: u8) -> SkBuff {
    SkBuff::from_slice(&frame(len, fill)).unwrap()
}

/// Let the DMA finish up to `frames` queued frames, writing `status` into
/// the last descriptor of each. Returns the frames completed and their
/// bytes as read from the bus.
pub fn hw_complete_tx(dev: &TestDev, frames: usize, status: u32) -> Vec<Vec<u8>> {
    let mut guard = dev.tx.lock();
    let q = guard.as_mut().expect("device not open");
    let size = q.ring.size();
    let mut done = Vec::new();
    let mut current = Vec::new();

    while done.len() < frames {
        let entry = dev.regs.tx_pos() % size;
        let p = q.ring.desc_mut(entry);
        if !p.owned_by_hw() {
            break;
        }
        let len = dev.ops.get_tx_len(p);
        current.extend(dev.hal.read_bus(p.buf1(), len));
        let last = dev.ops.get_tx_ls(p);
        p.take_from_hw();
        if last {
            p.set_des0(p.des0() | status);
            done.push(core::mem::take(&mut current));
        }
        dev.regs.advance_tx(1);
    }
    done
}

/// Deliver `data` (FCS appended by the fake) into the next receive
/// descriptor with `status` or-ed into RDES0. Returns false when the
/// descriptor is still owned by software (buffer unavailable).
pub fn hw_receive(dev: &TestDev, data: &[u8], status: u32) -> bool {
    let mut guard = dev.rx.lock();
    let q = guard.as_mut().expect("device not open");
    let entry = dev.regs.rx_pos() % q.ring.size();
    let p = q.ring.desc_mut(entry);
    if !p.owned_by_hw() {
        return false;
    }

    let mut wire = data.to_vec();
    wire.extend_from_slice(&[0u8; ETH_FCS_LEN]);
    dev.hal.write_bus(p.buf1(), &wire);
    p.set_des0(((wire.len() as u32) << RDES0_FL_SHIFT) | norm::RDES0_FS | norm::RDES0_LS | status);
    drop(guard);

    dev.regs.advance_rx();
    true
}

/// Receive and raise the receive interrupt
pub fn hw_receive_irq(dev: &TestDev, data: &[u8], status: u32) -> bool {
    let ok = hw_receive(dev, data, status);
    dev.regs.raise(DmaStatus::NIS | DmaStatus::RI);
    ok
}

// ============================================================================
// Ops table that records descriptor hand-off order
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescEvent {
    Prepare,
    Close,
    ClearIc,
    Own,
}

/// Forwards to a stock table and logs `(descriptor address, event)` for
/// every transmit descriptor write
pub struct RecordingOps {
    inner: &'static dyn MacOps,
    log: Mutex<Vec<(usize, DescEvent)>>,
}

impl RecordingOps {
    pub fn leak(inner: &'static dyn MacOps) -> &'static RecordingOps {
        Box::leak(Box::new(RecordingOps {
            inner,
            log: Mutex::new(Vec::new()),
        }))
    }

    pub fn events(&self) -> Vec<(usize, DescEvent)> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, p: &DmaDesc, ev: DescEvent) {
        self.log.lock().push((p as *const DmaDesc as usize, ev));
    }
}

impl DescOps for RecordingOps {
    fn tx_status(&self, p: &DmaDesc, stats: &NetDeviceCounters, x: &StmmacExtraCounters) -> TxFrameStatus {
        self.inner.tx_status(p, stats, x)
    }

    fn get_tx_len(&self, p: &DmaDesc) -> usize {
        self.inner.get_tx_len(p)
    }

    fn rx_status(&self, p: &DmaDesc, stats: &NetDeviceCounters, x: &StmmacExtraCounters) -> RxFrameStatus {
        self.inner.rx_status(p, stats, x)
    }

    fn init_rx_desc(&self, ring: &mut [DmaDesc], buf_len: usize) {
        self.inner.init_rx_desc(ring, buf_len)
    }

    fn disable_rx_ic(&self, ring: &mut [DmaDesc], every: i32) {
        self.inner.disable_rx_ic(ring, every)
    }

    fn init_tx_desc(&self, ring: &mut [DmaDesc]) {
        self.inner.init_tx_desc(ring)
    }

    fn get_tx_owner(&self, p: &DmaDesc) -> bool {
        self.inner.get_tx_owner(p)
    }

    fn set_tx_owner(&self, p: &mut DmaDesc) {
        self.record(p, DescEvent::Own);
        self.inner.set_tx_owner(p)
    }

    fn get_rx_owner(&self, p: &DmaDesc) -> bool {
        self.inner.get_rx_owner(p)
    }

    fn set_rx_owner(&self, p: &mut DmaDesc) {
        self.inner.set_rx_owner(p)
    }

    fn get_tx_ls(&self, p: &DmaDesc) -> bool {
        self.inner.get_tx_ls(p)
    }

    fn release_tx_desc(&self, p: &mut DmaDesc) {
        self.inner.release_tx_desc(p)
    }

    fn prepare_tx_desc(&self, p: &mut DmaDesc, is_fs: bool, len: usize, csum_flag: bool) {
        self.record(p, DescEvent::Prepare);
        self.inner.prepare_tx_desc(p, is_fs, len, csum_flag)
    }

    fn clear_tx_ic(&self, p: &mut DmaDesc) {
        self.record(p, DescEvent::ClearIc);
        self.inner.clear_tx_ic(p)
    }

    fn close_tx_desc(&self, p: &mut DmaDesc) {
        self.record(p, DescEvent::Close);
        self.inner.close_tx_desc(p)
    }

    fn get_rx_frame_len(&self, p: &DmaDesc) -> usize {
        self.inner.get_rx_frame_len(p)
    }
}

impl MacOps for RecordingOps {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn hw_cap(&self) -> HwCap {
        self.inner.hw_cap()
    }

    fn max_mtu(&self) -> usize {
        self.inner.max_mtu()
    }

    fn enhanced_desc(&self) -> bool {
        self.inner.enhanced_desc()
    }

    fn dma_init(&self, io: &dyn RegisterIo, pbl: u32, dma_tx: BusAddr, dma_rx: BusAddr) -> Result<()> {
        self.inner.dma_init(io, pbl, dma_tx, dma_rx)
    }

    fn dma_mode(&self, io: &dyn RegisterIo, txmode: u32, rxmode: u32) {
        self.inner.dma_mode(io, txmode, rxmode)
    }

    fn dump_dma_regs(&self, io: &dyn RegisterIo) {
        self.inner.dump_dma_regs(io)
    }

    fn core_init(&self, io: &dyn RegisterIo) {
        self.inner.core_init(io)
    }

    fn dump_mac_regs(&self, io: &dyn RegisterIo) {
        self.inner.dump_mac_regs(io)
    }

    fn host_irq_status(&self, io: &dyn RegisterIo, x: &StmmacExtraCounters) {
        self.inner.host_irq_status(io, x)
    }

    fn set_filter(&self, io: &dyn RegisterIo, filter: &RxFilter) {
        self.inner.set_filter(io, filter)
    }

    fn flow_ctrl(&self, io: &dyn RegisterIo, duplex: Duplex, fc: u32, pause_time: u32) {
        self.inner.flow_ctrl(io, duplex, fc, pause_time)
    }

    fn pmt(&self, io: &dyn RegisterIo, mode: WolOpts) {
        self.inner.pmt(io, mode)
    }

    fn set_umac_addr(&self, io: &dyn RegisterIo, addr: &MacAddress, reg_n: usize) {
        self.inner.set_umac_addr(io, addr, reg_n)
    }

    fn get_umac_addr(&self, io: &dyn RegisterIo, reg_n: usize) -> MacAddress {
        self.inner.get_umac_addr(io, reg_n)
    }
}
