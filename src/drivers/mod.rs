//! Device drivers subsystem
//!
//! Organized by device class after the Linux tree:
//! - `net`: Network device drivers

pub mod net;
