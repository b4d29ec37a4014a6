//! GMAC: the 10/100/1000 core
//!
//! Enhanced descriptors, receive checksum offload, 16 perfect-filter
//! address slots, the MMC counters and the PMT wake-up block.

use super::common::{
    DmaIntr, Duplex, FLOW_RX, FLOW_TX, HASH_TABLE_SIZE, HwCap, LinkBits, MacOps, WolOpts, dma,
    dma_reset, get_mac_addr_regs, multicast_hash, set_mac_addr_regs,
};
use super::hal::{BusAddr, RegisterIo};
use super::stats::StmmacExtraCounters;
use crate::drivers::net::netdev::{Result, RxFilter, bump};
use crate::net::ethernet::MacAddress;

// ============================================================================
// MAC registers
// ============================================================================

pub const GMAC_CONTROL: usize = 0x00;
pub const GMAC_FRAME_FILTER: usize = 0x04;
pub const GMAC_HASH_HIGH: usize = 0x08;
pub const GMAC_HASH_LOW: usize = 0x0c;
pub const GMAC_MII_ADDR: usize = 0x10;
pub const GMAC_MII_DATA: usize = 0x14;
pub const GMAC_FLOW_CTRL: usize = 0x18;
pub const GMAC_VLAN_TAG: usize = 0x1c;
pub const GMAC_VERSION: usize = 0x20;
pub const GMAC_WAKEUP_FILTER: usize = 0x28;
pub const GMAC_PMT: usize = 0x2c;
pub const GMAC_INT_STATUS: usize = 0x38;
pub const GMAC_INT_MASK: usize = 0x3c;

pub const fn gmac_addr_high(reg: usize) -> usize {
    0x40 + reg * 8
}

pub const fn gmac_addr_low(reg: usize) -> usize {
    0x44 + reg * 8
}

/// Address enable, slots 1..15
pub const GMAC_ADDR_AE: u32 = 1 << 31;
pub const GMAC_MAX_PERFECT_ADDRESSES: usize = 16;

// GMAC_CONTROL bits
pub const GMAC_CONTROL_WD: u32 = 1 << 23;
pub const GMAC_CONTROL_JD: u32 = 1 << 22;
pub const GMAC_CONTROL_BE: u32 = 1 << 21;
pub const GMAC_CONTROL_JE: u32 = 1 << 20;
/// Port select: 0 = GMII (1000), 1 = MII (10/100)
pub const GMAC_CONTROL_PS: u32 = 1 << 15;
/// 100 Mbps when PS is set
pub const GMAC_CONTROL_FES: u32 = 1 << 14;
pub const GMAC_CONTROL_DM: u32 = 1 << 11;
/// Checksum offload
pub const GMAC_CONTROL_IPC: u32 = 1 << 10;
/// Automatic pad/CRC stripping
pub const GMAC_CONTROL_ACS: u32 = 1 << 7;

pub const GMAC_CORE_INIT: u32 = GMAC_CONTROL_JD
    | GMAC_CONTROL_PS
    | GMAC_CONTROL_ACS
    | GMAC_CONTROL_IPC
    | GMAC_CONTROL_JE
    | GMAC_CONTROL_BE;

// GMAC_FRAME_FILTER bits
pub const GMAC_FRAME_FILTER_PR: u32 = 1 << 0;
pub const GMAC_FRAME_FILTER_HMC: u32 = 1 << 2;
pub const GMAC_FRAME_FILTER_PM: u32 = 1 << 4;

// GMAC_FLOW_CTRL bits
pub const GMAC_FLOW_CTRL_PT_SHIFT: u32 = 16;
pub const GMAC_FLOW_CTRL_RFE: u32 = 1 << 2;
pub const GMAC_FLOW_CTRL_TFE: u32 = 1 << 1;

// GMAC_PMT bits
pub const PMT_POWER_DOWN: u32 = 1 << 0;
pub const PMT_MAGIC_PKT_EN: u32 = 1 << 1;
pub const PMT_WAKEUP_FRAME_EN: u32 = 1 << 2;
pub const PMT_GLBL_UNICAST: u32 = 1 << 9;

bitflags::bitflags! {
    /// GMAC_INT_STATUS
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GmacIrq: u32 {
        const RGMII = 1 << 0;
        const PCS_LINK = 1 << 1;
        const PCS_ANE = 1 << 2;
        const PMT = 1 << 3;
        const MMC = 1 << 4;
        const MMC_RX = 1 << 5;
        const MMC_TX = 1 << 6;
        const MMC_RX_CSUM_OFFLOAD = 1 << 7;

        const _ = !0;
    }
}

/// Sources kept masked at init: RGMII, PCS link and auto-negotiation
const GMAC_INT_DISABLE: u32 = 0x207;

// MMC control/interrupt registers
pub const MMC_CNTRL: usize = 0x100;
pub const MMC_RX_INTR: usize = 0x104;
pub const MMC_TX_INTR: usize = 0x108;
pub const MMC_RX_CSUM_OFFLOAD_INTR: usize = 0x208;
pub const MMC_RX_CSUM_OFFLOAD_INTR_MASK: usize = 0x200;

// DMA_BUS_MODE on GMAC
pub const DMA_BUS_MODE_FB: u32 = 1 << 16;
pub const DMA_BUS_MODE_RPBL_SHIFT: u32 = 17;
pub const DMA_BUS_MODE_USP: u32 = 1 << 23;

// DMA_CONTROL (CSR6) on GMAC
pub const DMA_CONTROL_RSF: u32 = 1 << 25;
pub const DMA_CONTROL_TSF: u32 = 1 << 21;
pub const DMA_CONTROL_FTF: u32 = 1 << 20;
pub const DMA_CONTROL_TTC_SHIFT: u32 = 14;
pub const DMA_CONTROL_TTC_MASK: u32 = 0x7 << DMA_CONTROL_TTC_SHIFT;
pub const DMA_CONTROL_RTC_SHIFT: u32 = 3;
pub const DMA_CONTROL_RTC_MASK: u32 = 0x3 << DMA_CONTROL_RTC_SHIFT;
pub const DMA_CONTROL_OSF: u32 = 1 << 2;

/// Largest MTU the GMAC accepts (jumbo frames)
pub const JUMBO_LEN: usize = 9000;

pub struct Gmac;

pub static GMAC_OPS: Gmac = Gmac;

impl Gmac {
    /// Core version register: user version in bits 15:8, Synopsys in 7:0
    pub fn version(io: &dyn RegisterIo) -> u32 {
        io.read(GMAC_VERSION) & 0xffff
    }
}

impl MacOps for Gmac {
    fn name(&self) -> &'static str {
        "GMAC"
    }

    fn hw_cap(&self) -> HwCap {
        HwCap {
            pmt: true,
            link: LinkBits {
                port: GMAC_CONTROL_PS,
                duplex: GMAC_CONTROL_DM,
                speed: GMAC_CONTROL_FES,
            },
        }
    }

    fn max_mtu(&self) -> usize {
        JUMBO_LEN
    }

    fn enhanced_desc(&self) -> bool {
        true
    }

    fn dma_init(
        &self,
        io: &dyn RegisterIo,
        pbl: u32,
        dma_tx: BusAddr,
        dma_rx: BusAddr,
    ) -> Result<()> {
        dma_reset(io)?;

        io.write(
            dma::BUS_MODE,
            DMA_BUS_MODE_FB
                | DMA_BUS_MODE_USP
                | (pbl << dma::BUS_MODE_PBL_SHIFT)
                | (pbl << DMA_BUS_MODE_RPBL_SHIFT),
        );
        io.write(dma::INTR_ENA, DmaIntr::DEFAULT_MASK.bits());
        io.write(dma::TX_BASE_ADDR, dma_tx);
        io.write(dma::RCV_BASE_ADDR, dma_rx);
        Ok(())
    }

    fn dma_mode(&self, io: &dyn RegisterIo, txmode: u32, rxmode: u32) {
        let mut csr6 = io.read(dma::CONTROL);

        if txmode == dma::SF_DMA_MODE {
            log::debug!("[STMMAC] GMAC: enable TX store and forward mode");
            csr6 |= DMA_CONTROL_TSF;
        } else {
            log::debug!("[STMMAC] GMAC: disable TX SF (threshold {})", txmode);
            csr6 &= !(DMA_CONTROL_TSF | DMA_CONTROL_TTC_MASK);
            csr6 |= DMA_CONTROL_OSF;
            let ttc: u32 = match txmode {
                0..=16 => 7,
                17..=24 => 6,
                25..=32 => 5,
                33..=40 => 4,
                41..=64 => 0,
                65..=128 => 1,
                129..=192 => 2,
                _ => 3,
            };
            csr6 |= ttc << DMA_CONTROL_TTC_SHIFT;
        }

        if rxmode == dma::SF_DMA_MODE {
            log::debug!("[STMMAC] GMAC: enable RX store and forward mode");
            csr6 |= DMA_CONTROL_RSF;
        } else {
            log::debug!("[STMMAC] GMAC: disable RX SF (threshold {})", rxmode);
            csr6 &= !(DMA_CONTROL_RSF | DMA_CONTROL_RTC_MASK);
            let rtc: u32 = match rxmode {
                0..=32 => 1,
                33..=64 => 0,
                65..=96 => 2,
                _ => 3,
            };
            csr6 |= rtc << DMA_CONTROL_RTC_SHIFT;
        }

        io.write(dma::CONTROL, csr6);
    }

    fn dump_dma_regs(&self, io: &dyn RegisterIo) {
        log::debug!("[STMMAC] GMAC DMA registers");
        for (i, offset) in (dma::BUS_MODE..=dma::MISSED_FRAME_CTR).step_by(4).enumerate() {
            log::debug!("[STMMAC]   reg{} ({:#06x}) = {:#010x}", i, offset, io.read(offset));
        }
        log::debug!(
            "[STMMAC]   current host tx buffer ({:#06x}) = {:#010x}",
            dma::CUR_TX_BUF_ADDR,
            io.read(dma::CUR_TX_BUF_ADDR)
        );
        log::debug!(
            "[STMMAC]   current host rx buffer ({:#06x}) = {:#010x}",
            dma::CUR_RX_BUF_ADDR,
            io.read(dma::CUR_RX_BUF_ADDR)
        );
    }

    fn core_init(&self, io: &dyn RegisterIo) {
        io.set_bits(GMAC_CONTROL, GMAC_CORE_INIT);
        io.write(GMAC_INT_MASK, GMAC_INT_DISABLE);
        // keep the receive checksum offload counters from interrupting
        io.write(MMC_RX_CSUM_OFFLOAD_INTR_MASK, 0xffff_ffff);
    }

    fn dump_mac_regs(&self, io: &dyn RegisterIo) {
        log::debug!("[STMMAC] GMAC registers");
        for offset in (GMAC_CONTROL..=GMAC_INT_MASK).step_by(4) {
            log::debug!("[STMMAC]   reg {:#04x} = {:#010x}", offset, io.read(offset));
        }
    }

    fn host_irq_status(&self, io: &dyn RegisterIo, x: &StmmacExtraCounters) {
        let status = GmacIrq::from_bits_retain(io.read(GMAC_INT_STATUS));

        if status.intersects(GmacIrq::MMC | GmacIrq::MMC_RX | GmacIrq::MMC_TX | GmacIrq::MMC_RX_CSUM_OFFLOAD) {
            // reading the MMC interrupt registers acknowledges them
            if status.contains(GmacIrq::MMC_RX) {
                io.read(MMC_RX_INTR);
                bump(&x.mmc_rx_irq_n);
            }
            if status.contains(GmacIrq::MMC_TX) {
                io.read(MMC_TX_INTR);
                bump(&x.mmc_tx_irq_n);
            }
            if status.contains(GmacIrq::MMC_RX_CSUM_OFFLOAD) {
                io.read(MMC_RX_CSUM_OFFLOAD_INTR);
                bump(&x.mmc_rx_csum_offload_irq_n);
            }
        }
        if status.contains(GmacIrq::PMT) {
            // clear the PMT bits by reading the register
            io.read(GMAC_PMT);
            bump(&x.irq_receive_pmt_irq_n);
        }
        if status.intersects(GmacIrq::RGMII | GmacIrq::PCS_LINK | GmacIrq::PCS_ANE) {
            log::debug!("[STMMAC] GMAC: unhandled PCS/RGMII interrupt {:#x}", status.bits());
        }
    }

    fn set_filter(&self, io: &dyn RegisterIo, filter: &RxFilter) {
        let mut value = 0;

        if filter.promiscuous {
            value = GMAC_FRAME_FILTER_PR;
        } else if filter.all_multicast || filter.multicast.len() > HASH_TABLE_SIZE {
            value = GMAC_FRAME_FILTER_PM;
            io.write(GMAC_HASH_HIGH, 0xffff_ffff);
            io.write(GMAC_HASH_LOW, 0xffff_ffff);
        } else if !filter.multicast.is_empty() {
            value = GMAC_FRAME_FILTER_HMC;
            let (high, low) = multicast_hash(&filter.multicast);
            io.write(GMAC_HASH_HIGH, high);
            io.write(GMAC_HASH_LOW, low);
        }

        // slot 0 is the station address
        if filter.unicast.len() >= GMAC_MAX_PERFECT_ADDRESSES {
            value |= GMAC_FRAME_FILTER_PR;
        } else {
            for reg in 1..GMAC_MAX_PERFECT_ADDRESSES {
                match filter.unicast.get(reg - 1) {
                    Some(addr) => self.set_umac_addr(io, addr, reg),
                    None => {
                        io.write(gmac_addr_high(reg), 0);
                        io.write(gmac_addr_low(reg), 0);
                    }
                }
            }
        }

        io.write(GMAC_FRAME_FILTER, value);
        log::debug!(
            "[STMMAC] GMAC filter: frame filter {:#010x}, hash {:#010x} {:#010x}",
            value,
            io.read(GMAC_HASH_HIGH),
            io.read(GMAC_HASH_LOW)
        );
    }

    fn flow_ctrl(&self, io: &dyn RegisterIo, duplex: Duplex, fc: u32, pause_time: u32) {
        let mut flow = 0;

        if fc & FLOW_RX != 0 {
            flow |= GMAC_FLOW_CTRL_RFE;
        }
        if fc & FLOW_TX != 0 {
            flow |= GMAC_FLOW_CTRL_TFE;
        }
        if duplex == Duplex::Full {
            flow |= pause_time << GMAC_FLOW_CTRL_PT_SHIFT;
        }
        log::debug!("[STMMAC] GMAC flow control {:#010x}", flow);
        io.write(GMAC_FLOW_CTRL, flow);
    }

    fn pmt(&self, io: &dyn RegisterIo, mode: WolOpts) {
        let mut pmt = 0;

        if mode.contains(WolOpts::MAGIC) {
            pmt |= PMT_POWER_DOWN | PMT_MAGIC_PKT_EN;
        }
        if mode.contains(WolOpts::UCAST) {
            pmt |= PMT_POWER_DOWN | PMT_GLBL_UNICAST | PMT_WAKEUP_FRAME_EN;
        }
        io.write(GMAC_PMT, pmt);
    }

    fn set_umac_addr(&self, io: &dyn RegisterIo, addr: &MacAddress, reg_n: usize) {
        let flags = if reg_n == 0 { 0 } else { GMAC_ADDR_AE };
        set_mac_addr_regs(io, addr, gmac_addr_high(reg_n), gmac_addr_low(reg_n), flags);
    }

    fn get_umac_addr(&self, io: &dyn RegisterIo, reg_n: usize) -> MacAddress {
        get_mac_addr_regs(io, gmac_addr_high(reg_n), gmac_addr_low(reg_n))
    }
}
