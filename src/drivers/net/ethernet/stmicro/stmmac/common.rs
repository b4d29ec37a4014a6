//! Definitions shared by the MAC100 and GMAC cores
//!
//! The DMA register block (CSR0..CSR21 in Synopsys terms) is identical on
//! both cores. Everything that differs is reached through [`MacOps`] and
//! [`DescOps`], implemented once per core.

use bitflags::bitflags;

use super::descs::{DES0_OWN, DmaDesc, RDES0_FL_MASK, RDES0_FL_SHIFT};
use super::hal::{BusAddr, RegisterIo};
use super::stats::StmmacExtraCounters;
use crate::drivers::net::netdev::{NetDeviceCounters, NetworkError, Result, RxFilter};
use crate::net::ethernet::{MacAddress, ether_crc};

// ============================================================================
// Buffer sizes
// ============================================================================

pub const BUF_SIZE_16KIB: usize = 16384;
pub const BUF_SIZE_8KIB: usize = 8192;
pub const BUF_SIZE_4KIB: usize = 4096;
pub const BUF_SIZE_2KIB: usize = 2048;

/// Default DMA buffer size
pub const DMA_BUFFER_SIZE: usize = BUF_SIZE_2KIB;

/// Headroom reserved in every receive buffer so the IP header lands aligned
pub const STMMAC_IP_ALIGN: usize = 2;

/// Receive buffer size for a given MTU
pub fn buf_size_for_mtu(mtu: usize) -> usize {
    if mtu >= BUF_SIZE_8KIB {
        BUF_SIZE_16KIB
    } else if mtu >= BUF_SIZE_4KIB {
        BUF_SIZE_8KIB
    } else if mtu >= DMA_BUFFER_SIZE {
        BUF_SIZE_4KIB
    } else {
        DMA_BUFFER_SIZE
    }
}

// ============================================================================
// DMA registers
// ============================================================================

pub mod dma {
    /// CSR0: bus mode
    pub const BUS_MODE: usize = 0x1000;
    /// CSR1: transmit poll demand
    pub const XMT_POLL_DEMAND: usize = 0x1004;
    /// CSR2: receive poll demand
    pub const RCV_POLL_DEMAND: usize = 0x1008;
    /// CSR3: receive descriptor list base
    pub const RCV_BASE_ADDR: usize = 0x100c;
    /// CSR4: transmit descriptor list base
    pub const TX_BASE_ADDR: usize = 0x1010;
    /// CSR5: status
    pub const STATUS: usize = 0x1014;
    /// CSR6: operation mode
    pub const CONTROL: usize = 0x1018;
    /// CSR7: interrupt enable
    pub const INTR_ENA: usize = 0x101c;
    /// CSR8: missed frame and buffer overflow counter
    pub const MISSED_FRAME_CTR: usize = 0x1020;
    pub const CUR_TX_BUF_ADDR: usize = 0x1050;
    pub const CUR_RX_BUF_ADDR: usize = 0x1054;

    pub const BUS_MODE_SFT_RESET: u32 = 1 << 0;
    pub const BUS_MODE_PBL_SHIFT: u32 = 8;

    /// Bits of CSR5 that are write-1-to-clear
    pub const STATUS_W1C_MASK: u32 = 0x1ffff;

    /// Store-and-forward marker passed to `dma_mode`
    pub const SF_DMA_MODE: u32 = 1;

    /// Missed frame counter, CSR8[15:0], with its overflow flag
    pub const MISSED_FRAME_MASK: u32 = 0xffff;
    pub const MISSED_FRAME_OVF: u32 = 1 << 16;
    pub const OVERFLOW_FRAME_SHIFT: u32 = 17;
    pub const OVERFLOW_FRAME_MASK: u32 = 0x7ff;
}

bitflags! {
    /// DMA_STATUS (CSR5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaStatus: u32 {
        /// GMAC LPI / PMT interrupt
        const GPI = 1 << 28;
        /// GMAC MMC interrupt
        const GMI = 1 << 27;
        /// GMAC line interface interrupt
        const GLI = 1 << 26;
        const NIS = 1 << 16;
        const AIS = 1 << 15;
        const ERI = 1 << 14;
        const FBI = 1 << 13;
        const ETI = 1 << 10;
        const RWT = 1 << 9;
        const RPS = 1 << 8;
        const RU = 1 << 7;
        const RI = 1 << 6;
        const UNF = 1 << 5;
        const OVF = 1 << 4;
        const TJT = 1 << 3;
        const TU = 1 << 2;
        const TPS = 1 << 1;
        const TI = 1 << 0;

        const _ = !0;
    }
}

bitflags! {
    /// DMA_INTR_ENA (CSR7)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaIntr: u32 {
        const NIE = 1 << 16;
        const AIE = 1 << 15;
        const ERE = 1 << 14;
        const FBE = 1 << 13;
        const ETE = 1 << 10;
        const RWE = 1 << 9;
        const RSE = 1 << 8;
        const RUE = 1 << 7;
        const RIE = 1 << 6;
        const UNE = 1 << 5;
        const OVE = 1 << 4;
        const TJE = 1 << 3;
        const TUE = 1 << 2;
        const TSE = 1 << 1;
        const TIE = 1 << 0;

        const NORMAL = Self::NIE.bits() | Self::RIE.bits() | Self::TIE.bits();
        const ABNORMAL = Self::AIE.bits() | Self::FBE.bits() | Self::UNE.bits();
        const DEFAULT_MASK = Self::NORMAL.bits() | Self::ABNORMAL.bits();
        /// Everything but receive completion, while the poller runs
        const NO_RX = Self::NIE.bits() | Self::TIE.bits() | Self::ABNORMAL.bits();
    }
}

bitflags! {
    /// DMA_CONTROL (CSR6) bits common to both cores
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaControl: u32 {
        const ST = 1 << 13;
        const SR = 1 << 1;

        const _ = !0;
    }
}

// ============================================================================
// MAC registers common to both cores
// ============================================================================

/// MAC configuration register, offset 0 on both cores
pub const MAC_CTRL_REG: usize = 0x0000;
pub const MAC_ENABLE_TX: u32 = 1 << 3;
pub const MAC_ENABLE_RX: u32 = 1 << 2;

/// MMC interrupt masks, written all-ones at open
pub const MMC_HIGH_INTR_MASK: usize = 0x010c;
pub const MMC_LOW_INTR_MASK: usize = 0x0110;

/// Flow control request bits (`Config::flow_ctrl`)
pub const FLOW_OFF: u32 = 0;
pub const FLOW_RX: u32 = 1;
pub const FLOW_TX: u32 = 2;
pub const FLOW_AUTO: u32 = FLOW_TX | FLOW_RX;

/// Entries of the multicast hash table
pub const HASH_TABLE_SIZE: usize = 64;

bitflags! {
    /// Wake-on-LAN sources (ethtool `WAKE_*` values)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WolOpts: u32 {
        const PHY = 1 << 0;
        const UCAST = 1 << 1;
        const MCAST = 1 << 2;
        const BCAST = 1 << 3;
        const ARP = 1 << 4;
        const MAGIC = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    Half,
    Full,
}

/// MAC_CTRL bits the link code toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkBits {
    /// Port select (MII vs GMII)
    pub port: u32,
    pub duplex: u32,
    /// Fast-ethernet speed select, 0 when the core has none
    pub speed: u32,
}

/// Capabilities reported by an ops table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwCap {
    /// Power management (magic packet / wake-up frame) block present
    pub pmt: bool,
    pub link: LinkBits,
}

/// Outcome of decoding a receive descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxFrameStatus {
    /// Good frame; no checksum verdict from the hardware
    GoodFrame,
    /// Good frame whose IP/TCP/UDP checksums were verified by the MAC
    CsumUnnecessary,
    /// Frame is usable but the stack must check the checksums itself
    CsumNone,
    /// Errored frame, dropped
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFrameStatus {
    Ok,
    Error,
}

/// Descriptor vocabulary, one implementation per descriptor layout
pub trait DescOps: Send + Sync {
    /// Classify a completed transmit; counts errors into the statistics
    fn tx_status(
        &self,
        p: &DmaDesc,
        stats: &NetDeviceCounters,
        x: &StmmacExtraCounters,
    ) -> TxFrameStatus;

    /// Bytes mapped behind the descriptor (both buffers)
    fn get_tx_len(&self, p: &DmaDesc) -> usize;

    /// Classify a completed receive; counts errors into the statistics
    fn rx_status(
        &self,
        p: &DmaDesc,
        stats: &NetDeviceCounters,
        x: &StmmacExtraCounters,
    ) -> RxFrameStatus;

    /// Give every descriptor of a receive ring to the DMA with buffers of
    /// `buf_len` bytes; the last one closes the ring.
    fn init_rx_desc(&self, ring: &mut [DmaDesc], buf_len: usize);

    /// Suppress the completion interrupt on all but every `every`-th
    /// receive descriptor. `every <= 1` leaves all interrupts on.
    fn disable_rx_ic(&self, ring: &mut [DmaDesc], every: i32);

    /// Reset a transmit ring to software ownership; the last one closes the ring.
    fn init_tx_desc(&self, ring: &mut [DmaDesc]);

    fn get_tx_owner(&self, p: &DmaDesc) -> bool {
        p.owned_by_hw()
    }

    fn set_tx_owner(&self, p: &mut DmaDesc) {
        p.give_to_hw();
    }

    fn get_rx_owner(&self, p: &DmaDesc) -> bool {
        p.owned_by_hw()
    }

    /// Clear the stale write-back status and give the descriptor back
    fn set_rx_owner(&self, p: &mut DmaDesc) {
        p.set_des0(p.des0() & DES0_OWN);
        p.give_to_hw();
    }

    /// Last segment of a frame
    fn get_tx_ls(&self, p: &DmaDesc) -> bool;

    /// Clear a reclaimed transmit descriptor, keeping the ring-end marker
    fn release_tx_desc(&self, p: &mut DmaDesc);

    fn prepare_tx_desc(&self, p: &mut DmaDesc, is_fs: bool, len: usize, csum_flag: bool);

    fn clear_tx_ic(&self, p: &mut DmaDesc);

    /// Mark the last segment and request a completion interrupt
    fn close_tx_desc(&self, p: &mut DmaDesc);

    /// Received length including FCS
    fn get_rx_frame_len(&self, p: &DmaDesc) -> usize {
        ((p.des0() >> RDES0_FL_SHIFT) & RDES0_FL_MASK) as usize
    }
}

/// MAC and DMA core operations
pub trait MacOps: DescOps {
    fn name(&self) -> &'static str;

    fn hw_cap(&self) -> HwCap;

    fn max_mtu(&self) -> usize;

    /// Uses the enhanced descriptor layout
    fn enhanced_desc(&self) -> bool;

    /// Reset the DMA, program bus mode, interrupt mask and ring bases
    fn dma_init(
        &self,
        io: &dyn RegisterIo,
        pbl: u32,
        dma_tx: BusAddr,
        dma_rx: BusAddr,
    ) -> Result<()>;

    /// Program the FIFO operation mode: a threshold or `SF_DMA_MODE`
    fn dma_mode(&self, io: &dyn RegisterIo, txmode: u32, rxmode: u32);

    fn dump_dma_regs(&self, io: &dyn RegisterIo);

    /// Fold the hardware missed-frame counter into the statistics
    fn dma_diagnostic_fr(&self, io: &dyn RegisterIo, stats: &NetDeviceCounters, x: &StmmacExtraCounters) {
        let csr8 = io.read(dma::MISSED_FRAME_CTR);
        if csr8 == 0 {
            return;
        }
        let missed = (csr8 & dma::MISSED_FRAME_MASK) as u64;
        let overflow = ((csr8 >> dma::OVERFLOW_FRAME_SHIFT) & dma::OVERFLOW_FRAME_MASK) as u64;
        crate::drivers::net::netdev::add(&stats.rx_missed_errors, missed);
        crate::drivers::net::netdev::add(&x.rx_missed_cntr, missed);
        crate::drivers::net::netdev::add(&stats.rx_over_errors, overflow);
        crate::drivers::net::netdev::add(&x.rx_overflow_cntr, overflow);
    }

    fn core_init(&self, io: &dyn RegisterIo);

    fn dump_mac_regs(&self, io: &dyn RegisterIo);

    /// Core-specific interrupt sources (MMC, PMT, PCS); MAC100 has none
    fn host_irq_status(&self, _io: &dyn RegisterIo, _x: &StmmacExtraCounters) {}

    fn set_filter(&self, io: &dyn RegisterIo, filter: &RxFilter);

    fn flow_ctrl(&self, io: &dyn RegisterIo, duplex: Duplex, fc: u32, pause_time: u32);

    /// Arm (non-empty) or disarm (empty) wake-up on the given sources
    fn pmt(&self, io: &dyn RegisterIo, mode: WolOpts);

    fn set_umac_addr(&self, io: &dyn RegisterIo, addr: &MacAddress, reg_n: usize);

    fn get_umac_addr(&self, io: &dyn RegisterIo, reg_n: usize) -> MacAddress;
}

// ============================================================================
// Helpers shared by the ops implementations
// ============================================================================

/// Bounded wait for the DMA software reset to self-clear
pub(super) fn dma_reset(io: &dyn RegisterIo) -> Result<()> {
    const RESET_POLL_LIMIT: u32 = 100_000;

    io.set_bits(dma::BUS_MODE, dma::BUS_MODE_SFT_RESET);
    for _ in 0..RESET_POLL_LIMIT {
        if io.read(dma::BUS_MODE) & dma::BUS_MODE_SFT_RESET == 0 {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    Err(NetworkError::DmaInitFailed)
}

pub(super) fn dma_start_tx(io: &dyn RegisterIo) {
    io.set_bits(dma::CONTROL, DmaControl::ST.bits());
}

pub(super) fn dma_stop_tx(io: &dyn RegisterIo) {
    io.clear_bits(dma::CONTROL, DmaControl::ST.bits());
}

pub(super) fn dma_start_rx(io: &dyn RegisterIo) {
    io.set_bits(dma::CONTROL, DmaControl::SR.bits());
}

pub(super) fn dma_stop_rx(io: &dyn RegisterIo) {
    io.clear_bits(dma::CONTROL, DmaControl::SR.bits());
}

pub(super) fn mac_enable_tx(io: &dyn RegisterIo) {
    io.set_bits(MAC_CTRL_REG, MAC_ENABLE_TX);
}

pub(super) fn mac_disable_tx(io: &dyn RegisterIo) {
    io.clear_bits(MAC_CTRL_REG, MAC_ENABLE_TX);
}

pub(super) fn mac_enable_rx(io: &dyn RegisterIo) {
    io.set_bits(MAC_CTRL_REG, MAC_ENABLE_RX);
}

pub(super) fn mac_disable_rx(io: &dyn RegisterIo) {
    io.clear_bits(MAC_CTRL_REG, MAC_ENABLE_RX);
}

/// Address registers hold bytes 4..5 in the high word and 0..3 in the low word
pub(super) fn set_mac_addr_regs(io: &dyn RegisterIo, addr: &MacAddress, high: usize, low: usize, high_flags: u32) {
    let a = addr.as_bytes();
    io.write(high, ((a[5] as u32) << 8) | a[4] as u32 | high_flags);
    io.write(low, u32::from_le_bytes([a[0], a[1], a[2], a[3]]));
}

pub(super) fn get_mac_addr_regs(io: &dyn RegisterIo, high: usize, low: usize) -> MacAddress {
    let hi = io.read(high);
    let lo = io.read(low).to_le_bytes();
    MacAddress::new([lo[0], lo[1], lo[2], lo[3], hi as u8, (hi >> 8) as u8])
}

/// 64-bin multicast hash as (high, low) register values.
///
/// The upper six bits of the big-endian CRC select the bin; bit 5 of the
/// index picks the register.
pub(super) fn multicast_hash(addrs: &[MacAddress]) -> (u32, u32) {
    let mut hash = [0u32; 2];
    for addr in addrs {
        let bit_nr = ether_crc(addr) >> 26;
        hash[(bit_nr >> 5) as usize] |= 1 << (bit_nr & 31);
    }
    (hash[1], hash[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buf_size_for_mtu() {
        assert_eq!(buf_size_for_mtu(1500), BUF_SIZE_2KIB);
        assert_eq!(buf_size_for_mtu(2047), BUF_SIZE_2KIB);
        assert_eq!(buf_size_for_mtu(2048), BUF_SIZE_4KIB);
        assert_eq!(buf_size_for_mtu(4096), BUF_SIZE_8KIB);
        assert_eq!(buf_size_for_mtu(9000), BUF_SIZE_16KIB);
    }

    #[test]
    fn test_interrupt_masks() {
        assert_eq!(DmaIntr::DEFAULT_MASK.bits(), 0x0001_a061);
        assert!(!DmaIntr::NO_RX.contains(DmaIntr::RIE));
        assert!(DmaIntr::NO_RX.contains(DmaIntr::TIE | DmaIntr::ABNORMAL));
    }

    #[test]
    fn test_multicast_hash_bins() {
        // bins 31 and 62, see the CRC tests in net::ethernet
        let (high, low) = multicast_hash(&[
            MacAddress::new([0x01, 0x00, 0x5E, 0x00, 0x00, 0x01]),
            MacAddress::new([0x33, 0x33, 0x00, 0x00, 0x00, 0x01]),
        ]);
        assert_eq!(low, 1 << 31);
        assert_eq!(high, 1 << 30);
    }
}
