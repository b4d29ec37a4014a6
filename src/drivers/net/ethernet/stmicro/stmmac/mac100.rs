//! MAC100: the 10/100 core
//!
//! Normal descriptors, a single perfect-filter address, a 64-bin multicast
//! hash and no power management block.

use super::common::{
    Duplex, HASH_TABLE_SIZE, HwCap, LinkBits, MacOps, WolOpts, dma, dma_reset, get_mac_addr_regs,
    multicast_hash, set_mac_addr_regs, DmaIntr,
};
use super::hal::{BusAddr, RegisterIo};
use crate::drivers::net::netdev::{Result, RxFilter};
use crate::net::ethernet::{ETH_DATA_LEN, MacAddress};

// ============================================================================
// MAC registers
// ============================================================================

pub const MAC_CONTROL: usize = 0x00;
pub const MAC_ADDR_HIGH: usize = 0x04;
pub const MAC_ADDR_LOW: usize = 0x08;
pub const MAC_HASH_HIGH: usize = 0x0c;
pub const MAC_HASH_LOW: usize = 0x10;
pub const MAC_MII_ADDR: usize = 0x14;
pub const MAC_MII_DATA: usize = 0x18;
pub const MAC_FLOW_CTRL: usize = 0x1c;
pub const MAC_VLAN1: usize = 0x20;
pub const MAC_VLAN2: usize = 0x24;

// MAC_CONTROL bits
pub const MAC_CONTROL_RA: u32 = 1 << 31;
pub const MAC_CONTROL_HBD: u32 = 1 << 28;
/// Port select
pub const MAC_CONTROL_PS: u32 = 1 << 27;
/// Full duplex
pub const MAC_CONTROL_F: u32 = 1 << 20;
/// Pass all multicast
pub const MAC_CONTROL_PM: u32 = 1 << 19;
/// Promiscuous
pub const MAC_CONTROL_PR: u32 = 1 << 18;
/// Inverse filtering
pub const MAC_CONTROL_IF: u32 = 1 << 17;
/// Hash only
pub const MAC_CONTROL_HO: u32 = 1 << 15;
/// Hash/perfect filtering
pub const MAC_CONTROL_HP: u32 = 1 << 13;
/// Automatic pad stripping
pub const MAC_CONTROL_ASTP: u32 = 1 << 8;

pub const MAC_CORE_INIT: u32 = MAC_CONTROL_HBD | MAC_CONTROL_ASTP;

// MAC_FLOW_CTRL bits
pub const MAC_FLOW_CTRL_PT_SHIFT: u32 = 16;
pub const MAC_FLOW_CTRL_ENABLE: u32 = 1 << 1;

// DMA_CONTROL (CSR6) on MAC100
pub const DMA_CONTROL_SF: u32 = 1 << 21;
pub const DMA_CONTROL_TTC_MASK: u32 = 0x3 << 14;
pub const DMA_CONTROL_TTC_32: u32 = 0;
pub const DMA_CONTROL_TTC_64: u32 = 1 << 14;
pub const DMA_CONTROL_TTC_128: u32 = 2 << 14;
pub const DMA_CONTROL_TTC_256: u32 = 3 << 14;

/// Bus mode written at init, before the burst length
const DMA_BUS_MODE_DEFAULT: u32 = 0;

pub struct Mac100;

pub static MAC100_OPS: Mac100 = Mac100;

impl MacOps for Mac100 {
    fn name(&self) -> &'static str {
        "MAC100"
    }

    fn hw_cap(&self) -> HwCap {
        HwCap {
            pmt: false,
            link: LinkBits {
                port: MAC_CONTROL_PS,
                duplex: MAC_CONTROL_F,
                speed: 0,
            },
        }
    }

    fn max_mtu(&self) -> usize {
        ETH_DATA_LEN
    }

    fn enhanced_desc(&self) -> bool {
        false
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
            DMA_BUS_MODE_DEFAULT | (pbl << dma::BUS_MODE_PBL_SHIFT),
        );
        io.write(dma::INTR_ENA, DmaIntr::DEFAULT_MASK.bits());
        io.write(dma::TX_BASE_ADDR, dma_tx);
        io.write(dma::RCV_BASE_ADDR, dma_rx);
        Ok(())
    }

    /// MAC100 only has a transmit threshold; receive is always cut-through
    fn dma_mode(&self, io: &dyn RegisterIo, txmode: u32, _rxmode: u32) {
        let mut csr6 = io.read(dma::CONTROL);

        if txmode == dma::SF_DMA_MODE {
            csr6 |= DMA_CONTROL_SF;
        } else {
            csr6 &= !(DMA_CONTROL_SF | DMA_CONTROL_TTC_MASK);
            csr6 |= match txmode {
                0..=32 => DMA_CONTROL_TTC_32,
                33..=64 => DMA_CONTROL_TTC_64,
                65..=128 => DMA_CONTROL_TTC_128,
                _ => DMA_CONTROL_TTC_256,
            };
        }

        io.write(dma::CONTROL, csr6);
    }

    fn dump_dma_regs(&self, io: &dyn RegisterIo) {
        log::debug!("[STMMAC] MAC100 DMA CSR");
        for (i, offset) in (dma::BUS_MODE..=dma::MISSED_FRAME_CTR).step_by(4).enumerate() {
            log::debug!("[STMMAC]   CSR{} ({:#06x}) = {:#010x}", i, offset, io.read(offset));
        }
        log::debug!(
            "[STMMAC]   CSR20 ({:#06x}) = {:#010x}",
            dma::CUR_TX_BUF_ADDR,
            io.read(dma::CUR_TX_BUF_ADDR)
        );
        log::debug!(
            "[STMMAC]   CSR21 ({:#06x}) = {:#010x}",
            dma::CUR_RX_BUF_ADDR,
            io.read(dma::CUR_RX_BUF_ADDR)
        );
    }

    fn core_init(&self, io: &dyn RegisterIo) {
        io.set_bits(MAC_CONTROL, MAC_CORE_INIT);
        io.write(MAC_VLAN1, 0);
    }

    fn dump_mac_regs(&self, io: &dyn RegisterIo) {
        log::debug!("[STMMAC] MAC100 CSR");
        for (name, offset) in [
            ("control", MAC_CONTROL),
            ("addr high", MAC_ADDR_HIGH),
            ("addr low", MAC_ADDR_LOW),
            ("hash high", MAC_HASH_HIGH),
            ("hash low", MAC_HASH_LOW),
            ("mii addr", MAC_MII_ADDR),
            ("mii data", MAC_MII_DATA),
            ("flow ctrl", MAC_FLOW_CTRL),
            ("vlan1", MAC_VLAN1),
            ("vlan2", MAC_VLAN2),
        ] {
            log::debug!("[STMMAC]   {} ({:#04x}) = {:#010x}", name, offset, io.read(offset));
        }
    }

    fn set_filter(&self, io: &dyn RegisterIo, filter: &RxFilter) {
        let mut value = io.read(MAC_CONTROL);

        if filter.promiscuous || !filter.unicast.is_empty() {
            // a single perfect address: secondary unicast needs promiscuous
            value |= MAC_CONTROL_PR;
            value &= !(MAC_CONTROL_PM | MAC_CONTROL_IF | MAC_CONTROL_HO | MAC_CONTROL_HP);
        } else if filter.all_multicast || filter.multicast.len() > HASH_TABLE_SIZE {
            value |= MAC_CONTROL_PM;
            value &= !(MAC_CONTROL_PR | MAC_CONTROL_IF | MAC_CONTROL_HO);
            io.write(MAC_HASH_HIGH, 0xffff_ffff);
            io.write(MAC_HASH_LOW, 0xffff_ffff);
        } else if filter.multicast.is_empty() {
            value &= !(MAC_CONTROL_PM
                | MAC_CONTROL_PR
                | MAC_CONTROL_IF
                | MAC_CONTROL_HO
                | MAC_CONTROL_HP);
        } else {
            value |= MAC_CONTROL_HP;
            value &= !(MAC_CONTROL_PM | MAC_CONTROL_PR | MAC_CONTROL_IF | MAC_CONTROL_HO);
            let (high, low) = multicast_hash(&filter.multicast);
            io.write(MAC_HASH_HIGH, high);
            io.write(MAC_HASH_LOW, low);
        }

        io.write(MAC_CONTROL, value);
        log::debug!(
            "[STMMAC] MAC100 filter: control {:#010x}, hash {:#010x} {:#010x}",
            value,
            io.read(MAC_HASH_HIGH),
            io.read(MAC_HASH_LOW)
        );
    }

    fn flow_ctrl(&self, io: &dyn RegisterIo, duplex: Duplex, _fc: u32, pause_time: u32) {
        let mut flow = 0;
        if duplex == Duplex::Full {
            flow |= MAC_FLOW_CTRL_ENABLE | (pause_time << MAC_FLOW_CTRL_PT_SHIFT);
        }
        io.write(MAC_FLOW_CTRL, flow);
    }

    fn pmt(&self, _io: &dyn RegisterIo, _mode: WolOpts) {
        log::warn!("[STMMAC] MAC100 has no power management block");
    }

    fn set_umac_addr(&self, io: &dyn RegisterIo, addr: &MacAddress, _reg_n: usize) {
        set_mac_addr_regs(io, addr, MAC_ADDR_HIGH, MAC_ADDR_LOW, 0);
    }

    fn get_umac_addr(&self, io: &dyn RegisterIo, _reg_n: usize) -> MacAddress {
        get_mac_addr_regs(io, MAC_ADDR_HIGH, MAC_ADDR_LOW)
    }
}
