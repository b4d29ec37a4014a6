//! Normal descriptor handling (MAC100)

use super::common::{DescOps, RxFrameStatus, TxFrameStatus};
use super::descs::{CIC_FULL, DmaDesc, norm::*};
use super::mac100::Mac100;
use super::stats::StmmacExtraCounters;
use crate::drivers::net::netdev::{NetDeviceCounters, add, bump};

impl DescOps for Mac100 {
    fn tx_status(
        &self,
        p: &DmaDesc,
        stats: &NetDeviceCounters,
        x: &StmmacExtraCounters,
    ) -> TxFrameStatus {
        let des0 = p.des0();
        let mut ret = TxFrameStatus::Ok;

        if des0 & TDES0_ES != 0 {
            if des0 & TDES0_UF != 0 {
                bump(&x.tx_underflow);
                bump(&stats.tx_fifo_errors);
            }
            if des0 & TDES0_NC != 0 {
                bump(&x.tx_carrier);
                bump(&stats.tx_carrier_errors);
            }
            if des0 & TDES0_LOC != 0 {
                bump(&x.tx_losscarrier);
                bump(&stats.tx_carrier_errors);
            }
            if des0 & (TDES0_ED | TDES0_EC | TDES0_LC) != 0 {
                let cc = (des0 >> TDES0_CC_SHIFT) & TDES0_CC_MASK;
                add(&stats.collisions, cc as u64);
            }
            ret = TxFrameStatus::Error;
        }

        if des0 & TDES0_HF != 0 {
            bump(&x.tx_heartbeat);
            bump(&stats.tx_heartbeat_errors);
            ret = TxFrameStatus::Error;
        }

        if des0 & TDES0_DE != 0 {
            bump(&x.tx_deferred);
        }

        ret
    }

    fn get_tx_len(&self, p: &DmaDesc) -> usize {
        (p.des1() & TDES1_TBS1_MASK) as usize
    }

    fn rx_status(
        &self,
        p: &DmaDesc,
        stats: &NetDeviceCounters,
        x: &StmmacExtraCounters,
    ) -> RxFrameStatus {
        let des0 = p.des0();
        // MAC100 has no receive checksum engine
        let mut ret = RxFrameStatus::CsumNone;

        if des0 & RDES0_LS == 0 {
            log::warn!("[STMMAC] oversized frame spanned multiple buffers");
            bump(&stats.rx_length_errors);
            return RxFrameStatus::Discard;
        }

        if des0 & RDES0_ES != 0 {
            if des0 & RDES0_DE != 0 {
                bump(&x.rx_desc);
            }
            if des0 & RDES0_PFE != 0 {
                bump(&x.rx_partial);
            }
            if des0 & RDES0_RF != 0 {
                bump(&x.rx_runt);
            }
            if des0 & RDES0_TL != 0 {
                bump(&x.rx_toolong);
            }
            if des0 & RDES0_CS != 0 {
                bump(&x.rx_collision);
                bump(&stats.collisions);
            }
            if des0 & RDES0_CE != 0 {
                bump(&x.rx_crc);
                bump(&stats.rx_crc_errors);
            }
            ret = RxFrameStatus::Discard;
        }

        if des0 & RDES0_DBE != 0 {
            bump(&stats.rx_frame_errors);
            ret = RxFrameStatus::Discard;
        }

        if des0 & RDES0_LE != 0 {
            bump(&x.rx_length);
            ret = RxFrameStatus::Discard;
        }

        if des0 & RDES0_ME != 0 {
            bump(&x.rx_mii);
            ret = RxFrameStatus::Discard;
        }

        if des0 & RDES0_MF != 0 {
            bump(&x.rx_multicast);
            bump(&stats.multicast);
        }

        ret
    }

    fn init_rx_desc(&self, ring: &mut [DmaDesc], buf_len: usize) {
        let last = ring.len().saturating_sub(1);
        let rbs1 = (buf_len as u32).min(RDES1_RBS1_MASK);
        for (i, p) in ring.iter_mut().enumerate() {
            let mut des1 = rbs1;
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
                p.set_des1(TDES1_TER);
            }
        }
    }

    fn get_tx_ls(&self, p: &DmaDesc) -> bool {
        p.des1() & TDES1_LS != 0
    }

    fn release_tx_desc(&self, p: &mut DmaDesc) {
        let ter = p.des1() & TDES1_TER;
        p.set_des0(0);
        p.set_des1(ter);
    }

    fn prepare_tx_desc(&self, p: &mut DmaDesc, is_fs: bool, len: usize, csum_flag: bool) {
        debug_assert!(len as u32 <= TDES1_TBS1_MASK);
        let mut des1 = (p.des1() & TDES1_TER) | (len as u32 & TDES1_TBS1_MASK);
        if is_fs {
            des1 |= TDES1_FS;
        }
        if csum_flag {
            des1 |= CIC_FULL << TDES1_CIC_SHIFT;
        }
        p.set_des1(des1);
    }

    fn clear_tx_ic(&self, p: &mut DmaDesc) {
        p.set_des1(p.des1() & !TDES1_IC);
    }

    fn close_tx_desc(&self, p: &mut DmaDesc) {
        p.set_des1(p.des1() | TDES1_LS | TDES1_IC);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::ethernet::stmicro::stmmac::descs::DES0_OWN;
    use alloc::vec::Vec;

    fn ring(n: usize) -> Vec<DmaDesc> {
        (0..n).map(|_| DmaDesc::new()).collect()
    }

    #[test]
    fn test_init_rx_desc_owns_and_closes_ring() {
        let mut r = ring(4);
        Mac100.init_rx_desc(&mut r, 2046);
        Mac100.disable_rx_ic(&mut r, 2);
        for (i, p) in r.iter().enumerate() {
            assert!(p.owned_by_hw());
            assert_eq!(p.des1() & RDES1_RBS1_MASK, 2046);
            assert_eq!(p.des1() & RDES1_RER != 0, i == 3);
            assert_eq!(p.des1() & RDES1_DIC != 0, i % 2 == 1);
        }
    }

    #[test]
    fn test_tx_prepare_close_release_keeps_ring_end() {
        let mut r = ring(2);
        Mac100.init_tx_desc(&mut r);
        let p = &mut r[1];
        Mac100.prepare_tx_desc(p, true, 1514, false);
        Mac100.close_tx_desc(p);
        assert_eq!(Mac100.get_tx_len(p), 1514);
        assert!(Mac100.get_tx_ls(p));
        assert_eq!(p.des1() & (TDES1_FS | TDES1_IC), TDES1_FS | TDES1_IC);

        Mac100.clear_tx_ic(p);
        assert_eq!(p.des1() & TDES1_IC, 0);

        Mac100.release_tx_desc(p);
        assert_eq!(p.des0(), 0);
        assert_eq!(p.des1(), TDES1_TER);
    }

    #[test]
    fn test_tx_status_counts_errors() {
        let stats = NetDeviceCounters::default();
        let x = StmmacExtraCounters::default();
        let mut p = DmaDesc::new();

        p.set_des0(TDES0_ES | TDES0_NC | TDES0_EC | (3 << TDES0_CC_SHIFT));
        assert_eq!(Mac100.tx_status(&p, &stats, &x), TxFrameStatus::Error);
        assert_eq!(stats.snapshot().tx_carrier_errors, 1);
        assert_eq!(stats.snapshot().collisions, 3);
        assert_eq!(x.snapshot().tx_carrier, 1);

        p.set_des0(TDES0_DE);
        assert_eq!(Mac100.tx_status(&p, &stats, &x), TxFrameStatus::Ok);
        assert_eq!(x.snapshot().tx_deferred, 1);
    }

    #[test]
    fn test_rx_status_classification() {
        let stats = NetDeviceCounters::default();
        let x = StmmacExtraCounters::default();
        let mut p = DmaDesc::new();

        p.set_des0(RDES0_FS | RDES0_LS | (64 << 16));
        assert_eq!(Mac100.rx_status(&p, &stats, &x), RxFrameStatus::CsumNone);
        assert_eq!(Mac100.get_rx_frame_len(&p), 64);

        p.set_des0(RDES0_FS | RDES0_LS | RDES0_ES | RDES0_CE);
        assert_eq!(Mac100.rx_status(&p, &stats, &x), RxFrameStatus::Discard);
        assert_eq!(stats.snapshot().rx_crc_errors, 1);

        // not the last descriptor of the frame
        p.set_des0(RDES0_FS);
        assert_eq!(Mac100.rx_status(&p, &stats, &x), RxFrameStatus::Discard);
        assert_eq!(stats.snapshot().rx_length_errors, 1);

        p.set_des0(DES0_OWN);
        assert!(Mac100.get_rx_owner(&p));
    }
}
