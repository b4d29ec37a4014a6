//! DMA descriptor format
//!
//! Both cores use 16-byte descriptors of four little-endian words:
//!
//! ```text
//! des0  status (written back by the DMA); OWN in bit 31
//! des1  control: buffer sizes, ring end, chaining, first/last segment...
//! des2  buffer 1 bus address
//! des3  buffer 2 bus address (second half of jumbo buffers)
//! ```
//!
//! MAC100 uses the "normal" layout. GMAC uses the "enhanced" layout, which
//! moves the transmit control bits into des0 next to OWN and widens the
//! buffer size fields to 13 bits.

use core::fmt;
use core::sync::atomic::{Ordering, fence};
use volatile::Volatile;

use super::hal::BusAddr;

/// Descriptor owned by the DMA engine
pub const DES0_OWN: u32 = 1 << 31;

/// Received frame length, des0[29:16], both layouts
pub const RDES0_FL_SHIFT: u32 = 16;
pub const RDES0_FL_MASK: u32 = 0x3fff;

/// Bit layout of the normal descriptor (MAC100)
pub mod norm {
    // RDES0
    pub const RDES0_PCE: u32 = 1 << 0;
    pub const RDES0_CE: u32 = 1 << 1;
    pub const RDES0_DBE: u32 = 1 << 2;
    pub const RDES0_ME: u32 = 1 << 3;
    pub const RDES0_RWT: u32 = 1 << 4;
    pub const RDES0_FT: u32 = 1 << 5;
    pub const RDES0_CS: u32 = 1 << 6;
    pub const RDES0_TL: u32 = 1 << 7;
    pub const RDES0_LS: u32 = 1 << 8;
    pub const RDES0_FS: u32 = 1 << 9;
    pub const RDES0_MF: u32 = 1 << 10;
    pub const RDES0_RF: u32 = 1 << 11;
    pub const RDES0_LE: u32 = 1 << 12;
    pub const RDES0_PFE: u32 = 1 << 13;
    pub const RDES0_DE: u32 = 1 << 14;
    pub const RDES0_ES: u32 = 1 << 15;
    pub const RDES0_FF: u32 = 1 << 30;

    // RDES1
    pub const RDES1_RBS1_MASK: u32 = 0x7ff;
    pub const RDES1_RBS2_SHIFT: u32 = 11;
    pub const RDES1_RCH: u32 = 1 << 24;
    pub const RDES1_RER: u32 = 1 << 25;
    pub const RDES1_DIC: u32 = 1 << 31;

    // TDES0
    pub const TDES0_DE: u32 = 1 << 0;
    pub const TDES0_UF: u32 = 1 << 1;
    pub const TDES0_ED: u32 = 1 << 2;
    pub const TDES0_CC_SHIFT: u32 = 3;
    pub const TDES0_CC_MASK: u32 = 0xf;
    pub const TDES0_HF: u32 = 1 << 7;
    pub const TDES0_EC: u32 = 1 << 8;
    pub const TDES0_LC: u32 = 1 << 9;
    pub const TDES0_NC: u32 = 1 << 10;
    pub const TDES0_LOC: u32 = 1 << 11;
    pub const TDES0_ES: u32 = 1 << 15;

    // TDES1
    pub const TDES1_TBS1_MASK: u32 = 0x7ff;
    pub const TDES1_DP: u32 = 1 << 23;
    pub const TDES1_TCH: u32 = 1 << 24;
    pub const TDES1_TER: u32 = 1 << 25;
    pub const TDES1_DC: u32 = 1 << 26;
    pub const TDES1_CIC_SHIFT: u32 = 27;
    pub const TDES1_FS: u32 = 1 << 29;
    pub const TDES1_LS: u32 = 1 << 30;
    pub const TDES1_IC: u32 = 1 << 31;
}

/// Bit layout of the enhanced descriptor (GMAC)
pub mod enh {
    // RDES0
    pub const RDES0_PCE: u32 = 1 << 0;
    pub const RDES0_CE: u32 = 1 << 1;
    pub const RDES0_DBE: u32 = 1 << 2;
    pub const RDES0_RE: u32 = 1 << 3;
    pub const RDES0_RWT: u32 = 1 << 4;
    pub const RDES0_FT: u32 = 1 << 5;
    pub const RDES0_LC: u32 = 1 << 6;
    /// IPC checksum error / giant frame
    pub const RDES0_IPC: u32 = 1 << 7;
    pub const RDES0_LS: u32 = 1 << 8;
    pub const RDES0_FS: u32 = 1 << 9;
    pub const RDES0_VLAN: u32 = 1 << 10;
    pub const RDES0_OE: u32 = 1 << 11;
    pub const RDES0_LE: u32 = 1 << 12;
    pub const RDES0_SAF: u32 = 1 << 13;
    pub const RDES0_DE: u32 = 1 << 14;
    pub const RDES0_ES: u32 = 1 << 15;
    pub const RDES0_AFM: u32 = 1 << 30;

    // RDES1
    pub const RDES1_RBS1_MASK: u32 = 0x1fff;
    pub const RDES1_RCH: u32 = 1 << 14;
    pub const RDES1_RER: u32 = 1 << 15;
    pub const RDES1_RBS2_SHIFT: u32 = 16;
    pub const RDES1_DIC: u32 = 1 << 31;

    // TDES0: status in the low half, control in the high half
    pub const TDES0_DB: u32 = 1 << 0;
    pub const TDES0_UF: u32 = 1 << 1;
    pub const TDES0_ED: u32 = 1 << 2;
    pub const TDES0_CC_SHIFT: u32 = 3;
    pub const TDES0_CC_MASK: u32 = 0xf;
    pub const TDES0_VF: u32 = 1 << 7;
    pub const TDES0_EC: u32 = 1 << 8;
    pub const TDES0_LCO: u32 = 1 << 9;
    pub const TDES0_NC: u32 = 1 << 10;
    pub const TDES0_LC: u32 = 1 << 11;
    pub const TDES0_PCE: u32 = 1 << 12;
    pub const TDES0_FF: u32 = 1 << 13;
    pub const TDES0_JT: u32 = 1 << 14;
    pub const TDES0_ES: u32 = 1 << 15;
    pub const TDES0_IHE: u32 = 1 << 16;
    pub const TDES0_TCH: u32 = 1 << 20;
    pub const TDES0_TER: u32 = 1 << 21;
    pub const TDES0_CIC_SHIFT: u32 = 22;
    pub const TDES0_DC: u32 = 1 << 27;
    pub const TDES0_FS: u32 = 1 << 28;
    pub const TDES0_LS: u32 = 1 << 29;
    pub const TDES0_IC: u32 = 1 << 30;

    // TDES1
    pub const TDES1_TBS1_MASK: u32 = 0x1fff;
    pub const TDES1_TBS2_SHIFT: u32 = 16;
    pub const TDES1_TBS2_MASK: u32 = 0x1fff;
}

/// Checksum insertion control, TDES CIC field
pub const CIC_FULL: u32 = 3;

/// One DMA descriptor
///
/// All state shared with the DMA engine goes through volatile accesses.
/// Hardware ownership is only ever granted through [`DmaDesc::give_to_hw`],
/// which orders every earlier descriptor and buffer write before the OWN
/// bit becomes visible.
#[repr(C, align(16))]
pub struct DmaDesc {
    des0: Volatile<u32>,
    des1: Volatile<u32>,
    des2: Volatile<u32>,
    des3: Volatile<u32>,
}

impl DmaDesc {
    pub fn new() -> Self {
        Self {
            des0: Volatile::new(0),
            des1: Volatile::new(0),
            des2: Volatile::new(0),
            des3: Volatile::new(0),
        }
    }

    #[inline]
    pub fn des0(&self) -> u32 {
        self.des0.read()
    }

    #[inline]
    pub fn des1(&self) -> u32 {
        self.des1.read()
    }

    #[inline]
    pub fn set_des0(&mut self, value: u32) {
        self.des0.write(value);
    }

    #[inline]
    pub fn set_des1(&mut self, value: u32) {
        self.des1.write(value);
    }

    #[inline]
    pub fn buf1(&self) -> BusAddr {
        self.des2.read()
    }

    #[inline]
    pub fn set_buf1(&mut self, addr: BusAddr) {
        self.des2.write(addr);
    }

    #[inline]
    pub fn buf2(&self) -> BusAddr {
        self.des3.read()
    }

    #[inline]
    pub fn set_buf2(&mut self, addr: BusAddr) {
        self.des3.write(addr);
    }

    #[inline]
    pub fn owned_by_hw(&self) -> bool {
        self.des0.read() & DES0_OWN != 0
    }

    /// Publish the descriptor to the DMA engine
    #[inline]
    pub fn give_to_hw(&mut self) {
        fence(Ordering::SeqCst);
        let value = self.des0.read();
        self.des0.write(value | DES0_OWN);
    }

    /// Reclaim ownership without a completion (recovery paths)
    #[inline]
    pub fn take_from_hw(&mut self) {
        let value = self.des0.read();
        self.des0.write(value & !DES0_OWN);
    }

    /// Zero all four words
    pub fn clear(&mut self) {
        self.des0.write(0);
        self.des1.write(0);
        self.des2.write(0);
        self.des3.write(0);
    }
}

impl Default for DmaDesc {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DmaDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x} {:08x} {:08x} {:08x}",
            self.des0(),
            self.des1(),
            self.buf1(),
            self.buf2()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_is_four_words() {
        assert_eq!(core::mem::size_of::<DmaDesc>(), 16);
        assert_eq!(core::mem::align_of::<DmaDesc>(), 16);
    }

    #[test]
    fn test_ownership_accessors() {
        let mut d = DmaDesc::new();
        d.set_des0(0x1234);
        assert!(!d.owned_by_hw());
        d.give_to_hw();
        assert!(d.owned_by_hw());
        assert_eq!(d.des0(), DES0_OWN | 0x1234);
        d.take_from_hw();
        assert_eq!(d.des0(), 0x1234);
    }
}
