//! Enhanced descriptor handling (GMAC)
//!
//! The transmit control bits (first/last segment, interrupt on completion,
//! checksum insertion, ring end) live in TDES0 next to OWN, so every
//! control update here is a read-modify-write of des0 that must happen
//! while the descriptor is still software-owned.

use super::common::{BUF_SIZE_4KIB, BUF_SIZE_8KIB, DescOps, RxFrameStatus, TxFrameStatus};
use super::descs::{CIC_FULL, DmaDesc, enh::*};
use super::gmac::Gmac;
use super::stats::StmmacExtraCounters;
use crate::drivers::net::netdev::{NetDeviceCounters, add, bump};

/// Receive checksum offload verdict from (frame type, IPC error, payload error)
///
/// ```text
/// 0b000  802.3 frame, checksum engine bypassed     -> good frame
/// 0b100  IPv4/6 frame, checksums verified          -> checksum unnecessary
/// 0b101  payload checksum error                    -> checksum none
/// 0b110  IP header checksum error                  -> checksum none
/// 0b111  header and payload error                  -> checksum none
/// 0b001  IPv4/6 with unsupported payload           -> discard
/// 0b011  neither IPv4 nor IPv6                     -> discard
/// ```
fn coe_rdes0(ipc_err: bool, frame_type: bool, payload_err: bool) -> RxFrameStatus {
    let status = (((frame_type as u32) << 2) | ((ipc_err as u32) << 1) | payload_err as u32) & 0x7;
    match status {
        0x0 => RxFrameStatus::GoodFrame,
        0x4 => RxFrameStatus::CsumUnnecessary,
        0x5..=0x7 => {
            log::trace!("[STMMAC] RX COE checksum error {:#x}", status);
            RxFrameStatus::CsumNone
        }
        _ => {
            log::trace!("[STMMAC] RX COE unsupported frame {:#x}", status);
            RxFrameStatus::Discard
        }
    }
}

impl DescOps for Gmac {
    fn tx_status(
        &self,
        p: &DmaDesc,
        stats: &NetDeviceCounters,
        x: &StmmacExtraCounters,
    ) -> TxFrameStatus {
        let des0 = p.des0();
        let mut ret = TxFrameStatus::Ok;

        if des0 & TDES0_ES != 0 {
            if des0 & TDES0_JT != 0 {
                bump(&x.tx_jabber);
            }
            if des0 & TDES0_FF != 0 {
                bump(&x.tx_frame_flushed);
            }
            if des0 & TDES0_LC != 0 {
                bump(&x.tx_losscarrier);
                bump(&stats.tx_carrier_errors);
            }
            if des0 & TDES0_NC != 0 {
                bump(&x.tx_carrier);
                bump(&stats.tx_carrier_errors);
            }
            if des0 & (TDES0_LCO | TDES0_EC) != 0 {
                let cc = (des0 >> TDES0_CC_SHIFT) & TDES0_CC_MASK;
                add(&stats.collisions, cc as u64);
            }
            if des0 & TDES0_LCO != 0 {
                bump(&stats.tx_window_errors);
            }
            if des0 & TDES0_EC != 0 {
                bump(&stats.tx_aborted_errors);
            }
            if des0 & TDES0_ED != 0 {
                bump(&x.tx_deferred);
            }
            if des0 & TDES0_UF != 0 {
                bump(&x.tx_underflow);
                bump(&stats.tx_fifo_errors);
            }
            if des0 & TDES0_IHE != 0 {
                bump(&x.tx_ip_header_error);
            }
            if des0 & TDES0_PCE != 0 {
                bump(&x.tx_payload_error);
            }
            ret = TxFrameStatus::Error;
        }

        if des0 & TDES0_DB != 0 {
            bump(&x.tx_deferred);
            ret = TxFrameStatus::Error;
        }

        if des0 & TDES0_VF != 0 {
            bump(&x.tx_vlan);
        }

        ret
    }

    fn get_tx_len(&self, p: &DmaDesc) -> usize {
        let des1 = p.des1();
        let b1 = des1 & TDES1_TBS1_MASK;
        let b2 = (des1 >> TDES1_TBS2_SHIFT) & TDES1_TBS2_MASK;
        (b1 + b2) as usize
    }

    fn rx_status(
        &self,
        p: &DmaDesc,
        stats: &NetDeviceCounters,
        x: &StmmacExtraCounters,
    ) -> RxFrameStatus {
        let des0 = p.des0();
        let mut ret = RxFrameStatus::GoodFrame;

        if des0 & RDES0_ES != 0 {
            if des0 & RDES0_DE != 0 {
                bump(&x.rx_desc);
                bump(&stats.rx_length_errors);
            }
            if des0 & RDES0_OE != 0 {
                bump(&x.rx_gmac_overflow);
                bump(&stats.rx_fifo_errors);
            }
            if des0 & RDES0_IPC != 0 {
                bump(&x.rx_toolong);
            }
            if des0 & RDES0_LC != 0 {
                bump(&x.rx_collision);
                bump(&stats.collisions);
            }
            if des0 & RDES0_RWT != 0 {
                bump(&x.rx_watchdog);
            }
            if des0 & RDES0_RE != 0 {
                bump(&x.rx_mii);
            }
            if des0 & RDES0_CE != 0 {
                bump(&x.rx_crc);
                bump(&stats.rx_crc_errors);
            }
            ret = RxFrameStatus::Discard;
        }

        // the checksum engine only reports on otherwise good frames
        if ret == RxFrameStatus::GoodFrame {
            ret = coe_rdes0(
                des0 & RDES0_IPC != 0,
                des0 & RDES0_FT != 0,
                des0 & RDES0_PCE != 0,
            );
        }

        if des0 & RDES0_DBE != 0 {
            bump(&stats.rx_frame_errors);
            ret = RxFrameStatus::Discard;
        }
        if des0 & RDES0_SAF != 0 {
            bump(&x.sa_rx_filter_fail);
            ret = RxFrameStatus::Discard;
        }
        if des0 & RDES0_AFM != 0 {
            bump(&x.da_rx_filter_fail);
            ret = RxFrameStatus::Discard;
        }
        if des0 & RDES0_LE != 0 {
            bump(&x.rx_length);
            ret = RxFrameStatus::Discard;
        }
        if des0 & RDES0_VLAN != 0 {
            bump(&x.rx_vlan);
        }

        ret
    }

    fn init_rx_desc(&self, ring: &mut [DmaDesc], buf_len: usize) {
        let last = ring.len().saturating_sub(1);
        let rbs1 = (buf_len as u32).min(RDES1_RBS1_MASK);
        // second buffer starts 8 KiB into jumbo buffers
        let rbs2 = (buf_len.saturating_sub(BUF_SIZE_8KIB) as u32).min(RDES1_RBS1_MASK);
        for (i, p) in ring.iter_mut().enumerate() {
            let mut des1 = rbs1 | (rbs2 << RDES1_RBS2_SHIFT);
            if i == last {
                des1 |= RDES1_RER;
            }
            p.set_des1(des1);
            p.set_des0(0);
            p.give_to_hw();
        }
    }

    fn disable_rx_ic(&self, ring: &mut [DmaDesc], every: i32) {
        if every <= 1 {
            return;
        }
        for (i, p) in ring.iter_mut().enumerate() {
            if i % every as usize != 0 {
                p.set_des1(p.des1() | RDES1_DIC);
            }
        }
    }

    fn init_tx_desc(&self, ring: &mut [DmaDesc]) {
        let last = ring.len().saturating_sub(1);
        for (i, p) in ring.iter_mut().enumerate() {
            p.clear();
            if i == last {
                p.set_des0(TDES0_TER);
            }
        }
    }

    fn get_tx_ls(&self, p: &DmaDesc) -> bool {
        p.des0() & TDES0_LS != 0
    }

    fn release_tx_desc(&self, p: &mut DmaDesc) {
        let ter = p.des0() & TDES0_TER;
        p.set_des0(ter);
        p.set_des1(0);
    }

    fn prepare_tx_desc(&self, p: &mut DmaDesc, is_fs: bool, len: usize, csum_flag: bool) {
        let mut des0 = p.des0() & TDES0_TER;
        if is_fs {
            des0 |= TDES0_FS;
        }
        if csum_flag {
            des0 |= CIC_FULL << TDES0_CIC_SHIFT;
        }

        // jumbo buffers are split over both pointers, des3 = des2 + 4 KiB
        let des1 = if len > BUF_SIZE_4KIB {
            BUF_SIZE_4KIB as u32
                | (((len - BUF_SIZE_4KIB) as u32 & TDES1_TBS2_MASK) << TDES1_TBS2_SHIFT)
        } else {
            len as u32 & TDES1_TBS1_MASK
        };

        p.set_des1(des1);
        p.set_des0(des0);
    }

    fn clear_tx_ic(&self, p: &mut DmaDesc) {
        p.set_des0(p.des0() & !TDES0_IC);
    }

    fn close_tx_desc(&self, p: &mut DmaDesc) {
        p.set_des0(p.des0() | TDES0_LS | TDES0_IC);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_coe_verdicts() {
        assert_eq!(coe_rdes0(false, false, false), RxFrameStatus::GoodFrame);
        assert_eq!(coe_rdes0(false, true, false), RxFrameStatus::CsumUnnecessary);
        assert_eq!(coe_rdes0(false, true, true), RxFrameStatus::CsumNone);
        assert_eq!(coe_rdes0(true, true, false), RxFrameStatus::CsumNone);
        assert_eq!(coe_rdes0(true, true, true), RxFrameStatus::CsumNone);
        assert_eq!(coe_rdes0(false, false, true), RxFrameStatus::Discard);
        assert_eq!(coe_rdes0(true, false, true), RxFrameStatus::Discard);
    }

    #[test]
    fn test_jumbo_prepare_splits_buffers() {
        let mut p = DmaDesc::new();
        Gmac.prepare_tx_desc(&mut p, true, BUF_SIZE_8KIB, true);
        assert_eq!(p.des1() & TDES1_TBS1_MASK, 4096);
        assert_eq!((p.des1() >> TDES1_TBS2_SHIFT) & TDES1_TBS2_MASK, 4096);
        assert_eq!(Gmac.get_tx_len(&p), BUF_SIZE_8KIB);
        assert_eq!((p.des0() >> TDES0_CIC_SHIFT) & 0x3, CIC_FULL);
        assert!(p.des0() & TDES0_FS != 0);
        assert!(!p.owned_by_hw());

        Gmac.prepare_tx_desc(&mut p, false, 1000, false);
        assert_eq!(Gmac.get_tx_len(&p), 1000);
        assert_eq!(p.des0() & TDES0_FS, 0);
    }

    #[test]
    fn test_tx_ring_end_survives_release() {
        let mut r: Vec<DmaDesc> = (0..4).map(|_| DmaDesc::new()).collect();
        Gmac.init_tx_desc(&mut r);
        assert_eq!(r[3].des0(), TDES0_TER);

        Gmac.prepare_tx_desc(&mut r[3], true, 60, false);
        Gmac.close_tx_desc(&mut r[3]);
        Gmac.set_tx_owner(&mut r[3]);
        assert!(Gmac.get_tx_owner(&r[3]));
        assert!(Gmac.get_tx_ls(&r[3]));

        r[3].take_from_hw();
        Gmac.release_tx_desc(&mut r[3]);
        assert_eq!(r[3].des0(), TDES0_TER);
        assert_eq!(r[3].des1(), 0);
    }

    #[test]
    fn test_rx_status_verified_checksum() {
        let stats = NetDeviceCounters::default();
        let x = StmmacExtraCounters::default();
        let mut p = DmaDesc::new();

        p.set_des0(RDES0_FS | RDES0_LS | RDES0_FT | (100 << 16));
        assert_eq!(Gmac.rx_status(&p, &stats, &x), RxFrameStatus::CsumUnnecessary);

        p.set_des0(RDES0_FS | RDES0_LS | RDES0_ES | RDES0_OE);
        assert_eq!(Gmac.rx_status(&p, &stats, &x), RxFrameStatus::Discard);
        assert_eq!(x.snapshot().rx_gmac_overflow, 1);
    }

    #[test]
    fn test_jumbo_rx_buffer_sizes() {
        let mut r: Vec<DmaDesc> = (0..2).map(|_| DmaDesc::new()).collect();
        Gmac.init_rx_desc(&mut r, 16382);
        assert_eq!(r[0].des1() & RDES1_RBS1_MASK, 8191);
        assert_eq!((r[0].des1() >> RDES1_RBS2_SHIFT) & RDES1_RBS1_MASK, 16382 - 8192);
        assert!(r[1].des1() & RDES1_RER != 0);
    }
}
