//! STMicroelectronics 10/100/1000 Ethernet driver core
//!
//! A `no_std` driver for the Synopsys-derived MAC100 and GMAC cores found on
//! ST SoCs: descriptor rings, the per-core MAC/DMA operations table, the
//! transmit and NAPI-style receive paths, interrupt dispatch and recovery,
//! link adaptation and power management. The platform supplies register
//! access and DMA mapping through the traits in
//! [`drivers::net::ethernet::stmicro::stmmac::hal`]; [`net::stack`] plugs
//! the device into smoltcp.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod drivers;
pub mod net;
