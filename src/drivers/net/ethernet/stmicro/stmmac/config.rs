//! Driver tunables
//!
//! The defaults match the values the hardware was characterized with.
//! `verify_args` clamps silly values at initialization time with a warning,
//! `validate` is the strict check applied to runtime changes, and the
//! `FromStr` implementation parses a boot option string such as
//!
//! ```text
//! debug:16,phyaddr:1,dma_txsize:256,watchdog:4000,tc:0x40
//! ```

use bitflags::bitflags;
use core::str::FromStr;

use super::common::{BUF_SIZE_16KIB, DMA_BUFFER_SIZE, FLOW_AUTO, FLOW_OFF};
use crate::drivers::net::netdev::{NetworkError, Result};
use crate::net::ethernet::ETH_DATA_LEN;

/// Transmit watchdog, milliseconds
pub const TX_TIMEO: i32 = 5000;
pub const DMA_TX_SIZE: i32 = 128;
pub const DMA_RX_SIZE: i32 = 128;
/// Initial transmit FIFO threshold
pub const TC_DEFAULT: i32 = 64;
pub const PAUSE_TIME: i32 = 0x200;
/// Completion interrupt on every frame
pub const TX_NO_COALESCE: i32 = -1;
pub const RX_NO_COALESCE: i32 = 1;
/// Mitigation timer rate, Hz
pub const DEFAULT_PERIODIC_RATE: i32 = 256;

/// Smallest ring the driver will run with
pub const MIN_RING_SIZE: usize = 4;
/// Largest ring `validate` accepts
pub const MAX_RING_SIZE: usize = 4096;

bitflags! {
    /// Message classes selected by the `debug` tunable
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgLevel: u32 {
        const DRV = 0x0001;
        const PROBE = 0x0002;
        const LINK = 0x0004;
        const TIMER = 0x0008;
        const IFDOWN = 0x0010;
        const IFUP = 0x0020;
        const RX_ERR = 0x0040;
        const TX_ERR = 0x0080;
        const TX_QUEUED = 0x0100;
        const INTR = 0x0200;
        const TX_DONE = 0x0400;
        const RX_STATUS = 0x0800;
        const PKTDATA = 0x1000;
        const HW = 0x2000;
        const WOL = 0x4000;
    }
}

impl MsgLevel {
    pub const DEFAULT: Self = Self::DRV.union(Self::PROBE).union(Self::LINK).union(Self::IFUP).union(Self::IFDOWN).union(Self::TIMER);

    /// `debug < 0` selects the default set, otherwise the lowest `debug` classes
    pub fn from_debug(debug: i32) -> Self {
        match debug {
            d if d < 0 => Self::DEFAULT,
            0 => Self::empty(),
            d if d >= 32 => Self::all(),
            d => Self::from_bits_truncate((1u32 << d) - 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Message level, see [`MsgLevel::from_debug`]
    pub debug: i32,
    /// PHY address override, -1 keeps the platform value
    pub phyaddr: i32,
    pub dma_txsize: i32,
    pub dma_rxsize: i32,
    /// DMA buffer size; raised to what the MTU needs at open
    pub buf_sz: i32,
    /// Transmit FIFO threshold
    pub tc: i32,
    /// Use hardware transmit checksum insertion when available
    pub tx_coe: bool,
    /// Transmit watchdog timeout, milliseconds
    pub watchdog: i32,
    /// 0 = off, otherwise flow control in both directions
    pub flow_ctrl: i32,
    pub pause: i32,
    /// Frames between transmit completion interrupts, -1 disables
    pub tx_coalesce: i32,
    /// Receive descriptors between completion interrupts
    pub rx_coalesce: i32,
    /// Mitigation timer rate, Hz
    pub tmrate: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: -1,
            phyaddr: -1,
            dma_txsize: DMA_TX_SIZE,
            dma_rxsize: DMA_RX_SIZE,
            buf_sz: DMA_BUFFER_SIZE as i32,
            tc: TC_DEFAULT,
            tx_coe: true,
            watchdog: TX_TIMEO,
            flow_ctrl: FLOW_OFF as i32,
            pause: PAUSE_TIME,
            tx_coalesce: TX_NO_COALESCE,
            rx_coalesce: RX_NO_COALESCE,
            tmrate: DEFAULT_PERIODIC_RATE,
        }
    }
}

impl Config {
    /// Replace out-of-range values with defaults, logging each correction.
    pub fn verify_args(&mut self) {
        if self.watchdog < 0 {
            log::warn!("[STMMAC] watchdog {} invalid, using {}", self.watchdog, TX_TIMEO);
            self.watchdog = TX_TIMEO;
        }
        if self.dma_rxsize <= 0 {
            log::warn!("[STMMAC] dma_rxsize {} invalid, using {}", self.dma_rxsize, DMA_RX_SIZE);
            self.dma_rxsize = DMA_RX_SIZE;
        }
        if self.dma_txsize <= 0 {
            log::warn!("[STMMAC] dma_txsize {} invalid, using {}", self.dma_txsize, DMA_TX_SIZE);
            self.dma_txsize = DMA_TX_SIZE;
        }
        if self.tx_coalesce >= self.dma_txsize {
            log::warn!("[STMMAC] tx_coalesce {} >= ring size, disabled", self.tx_coalesce);
            self.tx_coalesce = TX_NO_COALESCE;
        }
        if self.rx_coalesce > self.dma_rxsize {
            log::warn!("[STMMAC] rx_coalesce {} > ring size, disabled", self.rx_coalesce);
            self.rx_coalesce = RX_NO_COALESCE;
        }
        if self.buf_sz < DMA_BUFFER_SIZE as i32 || self.buf_sz > BUF_SIZE_16KIB as i32 {
            log::warn!("[STMMAC] buf_sz {} invalid, using {}", self.buf_sz, DMA_BUFFER_SIZE);
            self.buf_sz = DMA_BUFFER_SIZE as i32;
        }
        if self.flow_ctrl > 1 {
            self.flow_ctrl = FLOW_AUTO as i32;
        } else if self.flow_ctrl < 0 {
            self.flow_ctrl = FLOW_OFF as i32;
        }
        if !(0..=0xffff).contains(&self.pause) {
            log::warn!("[STMMAC] pause {:#x} invalid, using {:#x}", self.pause, PAUSE_TIME);
            self.pause = PAUSE_TIME;
        }
        if self.tc <= 0 {
            self.tc = TC_DEFAULT;
        }
        if self.tmrate < 0 {
            self.tmrate = DEFAULT_PERIODIC_RATE;
        }
    }

    /// Strict check for runtime changes; nothing is modified.
    pub fn validate(&self) -> Result<()> {
        let ring = 1..=MAX_RING_SIZE as i32;
        let ok = self.watchdog >= 0
            && ring.contains(&self.dma_txsize)
            && ring.contains(&self.dma_rxsize)
            && self.tx_coalesce < self.dma_txsize
            && self.tx_coalesce >= TX_NO_COALESCE
            && (0..=self.dma_rxsize).contains(&self.rx_coalesce)
            && (DMA_BUFFER_SIZE as i32..=BUF_SIZE_16KIB as i32).contains(&self.buf_sz)
            && (0..=FLOW_AUTO as i32).contains(&self.flow_ctrl)
            && (0..=0xffff).contains(&self.pause)
            && self.tc > 0
            && self.tmrate >= 0
            && (-1..=31).contains(&self.phyaddr);
        if ok {
            Ok(())
        } else {
            Err(NetworkError::InvalidConfiguration)
        }
    }

    /// Pick coalescing values for the hardware generation when the user
    /// left both at their defaults.
    pub fn init_coalescence(&mut self, is_gmac: bool, mtu: usize) {
        if self.tx_coalesce != TX_NO_COALESCE || self.rx_coalesce != RX_NO_COALESCE {
            return;
        }
        if is_gmac {
            if mtu > ETH_DATA_LEN {
                self.rx_coalesce = 4;
                self.tx_coalesce = 4;
            } else {
                self.rx_coalesce = 32;
                self.tx_coalesce = 64;
            }
        } else {
            self.rx_coalesce = 16;
            self.tx_coalesce = 32;
        }
    }

    /// Flow control request bits for the MAC
    pub fn flow_mode(&self) -> u32 {
        if self.flow_ctrl != 0 { FLOW_AUTO } else { FLOW_OFF }
    }

    pub fn msg_level(&self) -> MsgLevel {
        MsgLevel::from_debug(self.debug)
    }
}

/// Round a requested ring size up to a power of two, at least `MIN_RING_SIZE`.
///
/// Cursors are free-running `u32`s reduced modulo the ring size, which only
/// stays continuous across the wrap when the size divides 2^32.
pub fn align_ring_size(requested: i32) -> usize {
    let n = usize::try_from(requested).unwrap_or(MIN_RING_SIZE);
    n.clamp(MIN_RING_SIZE, MAX_RING_SIZE).next_power_of_two()
}

/// `strtoul` with base 0: `0x` hex, leading `0` octal, else decimal.
/// A leading `-` is accepted for the signed tunables.
fn parse_int(s: &str) -> Option<i32> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    let value = if neg { -value } else { value };
    i32::try_from(value).ok()
}

impl FromStr for Config {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(NetworkError::InvalidConfiguration);
        }

        let mut config = Self::default();
        for opt in s.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = opt
                .split_once(':')
                .ok_or(NetworkError::InvalidConfiguration)?;
            let value = parse_int(value.trim()).ok_or(NetworkError::InvalidConfiguration)?;
            match key.trim() {
                "debug" => config.debug = value,
                "phyaddr" => config.phyaddr = value,
                "dma_txsize" => config.dma_txsize = value,
                "dma_rxsize" => config.dma_rxsize = value,
                "buf_sz" => config.buf_sz = value,
                "tc" => config.tc = value,
                "tx_coe" => config.tx_coe = value != 0,
                "watchdog" => config.watchdog = value,
                "flow_ctrl" => config.flow_ctrl = value,
                "pause" => config.pause = value,
                "tx_coalesce" => config.tx_coalesce = value,
                "rx_coalesce" => config.rx_coalesce = value,
                "tmrate" => config.tmrate = value,
                other => log::debug!("[STMMAC] ignoring unknown option {}", other),
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boot_options() {
        let c: Config = "debug:16,phyaddr:1,dma_txsize:256,watchdog:4000,tc:0x40,pause:0100,tx_coe:0"
            .parse()
            .unwrap();
        assert_eq!(c.debug, 16);
        assert_eq!(c.phyaddr, 1);
        assert_eq!(c.dma_txsize, 256);
        assert_eq!(c.watchdog, 4000);
        assert_eq!(c.tc, 64);
        assert_eq!(c.pause, 0o100);
        assert!(!c.tx_coe);
        assert_eq!(c.dma_rxsize, DMA_RX_SIZE);
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        assert!("".parse::<Config>().is_err());
        assert!("debug".parse::<Config>().is_err());
        assert!("watchdog:abc".parse::<Config>().is_err());
        // unknown keys are ignored
        let c: Config = "bogus:1,tmrate:512".parse().unwrap();
        assert_eq!(c.tmrate, 512);
    }

    #[test]
    fn test_verify_args_clamps() {
        let mut c = Config {
            watchdog: -5,
            dma_txsize: -1,
            tx_coalesce: 500,
            rx_coalesce: 500,
            buf_sz: 100,
            flow_ctrl: 7,
            pause: 0x10000,
            ..Config::default()
        };
        c.verify_args();
        assert_eq!(c.watchdog, TX_TIMEO);
        assert_eq!(c.dma_txsize, DMA_TX_SIZE);
        assert_eq!(c.tx_coalesce, TX_NO_COALESCE);
        assert_eq!(c.rx_coalesce, RX_NO_COALESCE);
        assert_eq!(c.buf_sz, DMA_BUFFER_SIZE as i32);
        assert_eq!(c.flow_ctrl, FLOW_AUTO as i32);
        assert_eq!(c.pause, PAUSE_TIME);
    }

    #[test]
    fn test_validate_is_strict() {
        assert!(Config::default().validate().is_ok());
        let bad = Config {
            tx_coalesce: 128,
            ..Config::default()
        };
        assert_eq!(bad.validate(), Err(NetworkError::InvalidConfiguration));
        let bad = Config {
            dma_rxsize: 0,
            ..Config::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_coalescing_defaults_per_core() {
        let mut c = Config::default();
        c.init_coalescence(true, 1500);
        assert_eq!((c.rx_coalesce, c.tx_coalesce), (32, 64));

        let mut c = Config::default();
        c.init_coalescence(true, 9000);
        assert_eq!((c.rx_coalesce, c.tx_coalesce), (4, 4));

        let mut c = Config::default();
        c.init_coalescence(false, 1500);
        assert_eq!((c.rx_coalesce, c.tx_coalesce), (16, 32));

        // user choices are kept
        let mut c = Config {
            tx_coalesce: 8,
            ..Config::default()
        };
        c.init_coalescence(true, 1500);
        assert_eq!((c.rx_coalesce, c.tx_coalesce), (RX_NO_COALESCE, 8));
    }

    #[test]
    fn test_align_ring_size() {
        assert_eq!(align_ring_size(128), 128);
        assert_eq!(align_ring_size(100), 128);
        assert_eq!(align_ring_size(1), MIN_RING_SIZE);
        assert_eq!(align_ring_size(-3), MIN_RING_SIZE);
        assert_eq!(align_ring_size(100_000), MAX_RING_SIZE);
    }

    #[test]
    fn test_msg_level() {
        assert_eq!(MsgLevel::from_debug(-1), MsgLevel::DEFAULT);
        assert!(MsgLevel::from_debug(0).is_empty());
        assert!(MsgLevel::from_debug(16).contains(MsgLevel::HW));
        assert!(!MsgLevel::from_debug(3).contains(MsgLevel::TIMER));
    }
}
