//! smoltcp integration
//!
//! [`DeviceAdapter`] exposes any [`NetworkDevice`] as a
//! `smoltcp::phy::Device`. Received frames are pulled from the device with
//! `poll` into a small backlog and handed to smoltcp one at a time;
//! transmit tokens build an `SkBuff` and queue it with `start_xmit`.
//!
//! ```ignore
//! let mut adapter = DeviceAdapter::new(&dev, 16);
//! let mut iface = Interface::new(config, &mut adapter, Instant::from_millis(now));
//! loop {
//!     iface.poll(Instant::from_millis(now), &mut adapter, &mut sockets);
//! }
//! ```

use alloc::collections::VecDeque;

use smoltcp::phy::{Device, DeviceCapabilities, Medium, RxToken, TxToken};
use smoltcp::time::Instant;

use crate::drivers::net::netdev::{NetworkDevice, TxOutcome};
use crate::net::ethernet::ETH_HLEN;
use crate::net::skbuff::{ChecksumState, SkBuff};

pub struct DeviceAdapter<'d, D: NetworkDevice> {
    dev: &'d D,
    backlog: VecDeque<SkBuff>,
    /// Frames pulled from the device per refill of the backlog
    budget: usize,
}

impl<'d, D: NetworkDevice> DeviceAdapter<'d, D> {
    pub fn new(dev: &'d D, budget: usize) -> Self {
        Self {
            dev,
            backlog: VecDeque::new(),
            budget: budget.max(1),
        }
    }

    pub fn device(&self) -> &'d D {
        self.dev
    }

    /// Frames received but not yet consumed by smoltcp
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

impl<D: NetworkDevice> Device for DeviceAdapter<'_, D> {
    type RxToken<'a>
        = AdapterRxToken
    where
        Self: 'a;
    type TxToken<'a>
        = AdapterTxToken<'a, D>
    where
        Self: 'a;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        if self.backlog.is_empty() {
            self.dev.poll(self.budget, &mut self.backlog);
        }
        let skb = self.backlog.pop_front()?;
        Some((AdapterRxToken { skb }, AdapterTxToken { dev: self.dev }))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        if self.dev.can_transmit() {
            Some(AdapterTxToken { dev: self.dev })
        } else {
            None
        }
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.medium = Medium::Ethernet;
        caps.max_transmission_unit = self.dev.mtu() + ETH_HLEN;
        caps.max_burst_size = Some(self.budget);
        caps
    }
}

pub struct AdapterRxToken {
    skb: SkBuff,
}

impl RxToken for AdapterRxToken {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(self.skb.data_mut())
    }
}

pub struct AdapterTxToken<'a, D: NetworkDevice> {
    dev: &'a D,
}

impl<D: NetworkDevice> TxToken for AdapterTxToken<'_, D> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut skb = match SkBuff::alloc(len) {
            Ok(skb) => skb,
            Err(e) => {
                log::warn!("[NET] tx: no buffer for {} bytes: {}", len, e);
                let mut scratch = alloc::vec![0u8; len];
                return f(&mut scratch);
            }
        };
        let result = match skb.put(len) {
            Ok(buf) => f(buf),
            Err(_) => {
                let mut scratch = alloc::vec![0u8; len];
                return f(&mut scratch);
            }
        };
        skb.set_ip_summed(ChecksumState::None);

        match self.dev.start_xmit(skb) {
            Ok(TxOutcome::Accepted) => {}
            Ok(TxOutcome::Busy(_)) => log::debug!("[NET] tx: ring full, frame dropped"),
            Err(e) => log::warn!("[NET] tx failed: {}", e),
        }
        result
    }
}
