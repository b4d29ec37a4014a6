//! Link adaptation
//!
//! The PHY state machine runs outside the driver. Whenever it resolves a
//! new link state it reports it through [`Stmmac::adjust_link`], which
//! retunes MAC_CTRL (duplex, port select, fast-ethernet speed) and the flow
//! control unit to match.

use core::sync::atomic::Ordering;

use super::common::{Duplex, MAC_CTRL_REG};
use super::config::MsgLevel;
use super::hal::{RegisterIo, StmmacHal};
use super::Stmmac;
use crate::drivers::net::netdev::{NetworkError, Result};

/// Link parameters as resolved by the PHY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyState {
    pub link: bool,
    /// Mbit/s
    pub speed: u32,
    pub duplex: Duplex,
    /// Link partner agreed to pause frames
    pub pause: bool,
}

impl PhyState {
    pub const fn down() -> Self {
        Self {
            link: false,
            speed: 0,
            duplex: Duplex::Half,
            pause: false,
        }
    }

    pub const fn up(speed: u32, duplex: Duplex) -> Self {
        Self {
            link: true,
            speed,
            duplex,
            pause: false,
        }
    }
}

impl<R: RegisterIo, H: StmmacHal> Stmmac<R, H> {
    /// Apply a link change. Returns whether anything the driver tracks
    /// actually changed.
    pub fn adjust_link(&self, phy: &PhyState) -> bool {
        let mut core = self.core.lock();
        let mut new_state = false;
        let link = self.hw.link;

        if phy.link {
            let mut ctrl = self.regs.read(MAC_CTRL_REG);

            // Now we make sure that we can be in full duplex mode.
            // If not, we operate in half-duplex mode.
            if core.oldduplex != Some(phy.duplex) {
                new_state = true;
                match phy.duplex {
                    Duplex::Half => ctrl &= !link.duplex,
                    Duplex::Full => ctrl |= link.duplex,
                }
                core.oldduplex = Some(phy.duplex);
                self.full_duplex
                    .store(phy.duplex == Duplex::Full, Ordering::Relaxed);
            }

            if phy.pause {
                self.ops
                    .flow_ctrl(&self.regs, phy.duplex, core.flow_ctrl, core.pause);
            }

            if phy.speed != core.speed {
                new_state = true;
                match phy.speed {
                    1000 => {
                        if self.is_gmac {
                            ctrl &= !link.port;
                        }
                        self.fix_mac_speed(phy.speed);
                    }
                    100 | 10 => {
                        if self.is_gmac {
                            ctrl |= link.port;
                            if phy.speed == 100 {
                                ctrl |= link.speed;
                            } else {
                                ctrl &= !link.speed;
                            }
                        } else {
                            ctrl &= !link.port;
                        }
                        self.fix_mac_speed(phy.speed);
                    }
                    other => {
                        if self.msg_level().contains(MsgLevel::LINK) {
                            log::warn!("[STMMAC] speed ({}) is not 10, 100 or 1000", other);
                        }
                    }
                }
                core.speed = phy.speed;
            }

            self.regs.write(MAC_CTRL_REG, ctrl);

            if !core.oldlink {
                new_state = true;
                core.oldlink = true;
            }
        } else if core.oldlink {
            new_state = true;
            core.oldlink = false;
            core.speed = 0;
            core.oldduplex = None;
        }

        self.carrier.store(core.oldlink, Ordering::Release);

        if new_state && self.msg_level().contains(MsgLevel::LINK) {
            if core.oldlink {
                log::info!(
                    "[STMMAC] link up - {} Mbps / {:?} duplex",
                    core.speed,
                    phy.duplex
                );
            } else {
                log::info!("[STMMAC] link down");
            }
        }
        new_state
    }

    fn fix_mac_speed(&self, speed: u32) {
        if let Some(fix) = self.plat.fix_mac_speed {
            fix(speed);
        }
    }

    /// Forget the last link state and check the attached PHY.
    pub(super) fn init_phy(&self) -> Result<()> {
        {
            let mut core = self.core.lock();
            core.oldlink = false;
            core.speed = 0;
            core.oldduplex = None;
        }
        self.carrier.store(false, Ordering::Release);

        match self.phy.lock().as_ref() {
            Some(phy) if phy.phy_id() == 0 => {
                log::error!("[STMMAC] no PHY found at address {}", self.plat.phy_addr);
                Err(NetworkError::PhyAttachFailed)
            }
            Some(phy) => {
                log::debug!(
                    "[STMMAC] PHY {} id {:#010x}",
                    self.plat.phy_addr,
                    phy.phy_id()
                );
                Ok(())
            }
            None => {
                log::debug!("[STMMAC] no PHY attached; link reported by the caller");
                Ok(())
            }
        }
    }
}
