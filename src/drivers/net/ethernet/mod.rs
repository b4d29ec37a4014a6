//! Ethernet controllers, grouped by vendor

pub mod stmicro;
