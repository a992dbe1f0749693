//! Network module for Nuage definitions and OVS interface binding.
//!
//! This module provides:
//! - Network definition validation (structural only)
//! - Interface binding records
//! - Libvirt interface rewriting for the OVS/VRS bridge

mod ovs;
mod types;

pub use ovs::{interface_mac, interface_target_dev, target_dev_for_mac, OvsBridge};
pub use types::*;
