//! OVS bridge binding for libvirt interface elements.
//!
//! Rewrites a domain `<interface>` in place so libvirt plugs it into the
//! Nuage VRS bridge through an openvswitch virtual port:
//!
//! ```xml
//! <interface type='bridge'>
//!   <mac address='00:11:22:33:44:55'/>
//!   <source bridge='alubr0'/>
//!   <virtualport type='openvswitch'/>
//!   <target dev='001122334455'/>
//! </interface>
//! ```

use tracing::debug;

use crate::types::{DEFAULT_BRIDGE, VIRTUALPORT_TYPE};
use crate::xml::Element;

/// Derive the tap device name for a MAC: separators removed, case kept.
///
/// The same function is used to generate the name and to later recognise
/// interfaces this crate produced.
pub fn target_dev_for_mac(mac: &str) -> String {
    mac.chars().filter(|c| *c != ':' && *c != '-').collect()
}

/// MAC address of a domain interface (`<mac address=.../>`), if any.
pub fn interface_mac(interface: &Element) -> Option<&str> {
    interface
        .child("mac")
        .and_then(|m| m.attr("address"))
        .filter(|m| !m.is_empty())
}

/// Tap device name of a domain interface (`<target dev=.../>`), if any.
pub fn interface_target_dev(interface: &Element) -> Option<&str> {
    interface.child("target").and_then(|t| t.attr("dev"))
}

/// Binds domain interfaces to a single OVS bridge.
#[derive(Debug, Clone)]
pub struct OvsBridge {
    bridge: String,
}

impl OvsBridge {
    pub fn new(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.bridge
    }

    /// Rewrite `interface` to attach to this bridge with a tap named after
    /// `mac`.
    pub fn bind_interface(&self, interface: &mut Element, mac: &str) {
        let target_dev = target_dev_for_mac(mac);
        debug!(
            bridge = %self.bridge,
            mac = %mac,
            target_dev = %target_dev,
            "Binding interface to OVS bridge"
        );

        interface.set_attr("type", "bridge");
        interface.remove_attr("name");
        interface.replace_child(Element::new("source").with_attr("bridge", self.bridge.as_str()));
        interface.replace_child(Element::new("virtualport").with_attr("type", VIRTUALPORT_TYPE));
        interface.replace_child(Element::new("target").with_attr("dev", target_dev));
    }
}

impl Default for OvsBridge {
    fn default() -> Self {
        Self::new(DEFAULT_BRIDGE)
    }
}
