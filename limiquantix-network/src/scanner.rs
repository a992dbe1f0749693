//! Finds machines whose persisted description references a network.

use tracing::debug;

use crate::types::{MachineRecord, NETWORK_ELEMENT, NUAGE_ELEMENT};
use crate::xml::Element;

/// Network names recorded in a description's `metadata/nuage` block.
pub fn referenced_networks(domain: &Element) -> Vec<String> {
    domain
        .child("metadata")
        .into_iter()
        .flat_map(|metadata| metadata.children_named(NUAGE_ELEMENT))
        .flat_map(|nuage| nuage.children_named(NETWORK_ELEMENT))
        .filter_map(|network| network.attr("name"))
        .map(str::to_string)
        .collect()
}

/// Return the machines whose description references `network`.
///
/// Names are compared case-insensitively. Machines without a persisted
/// description, with one that does not parse, or without a binding block are
/// skipped. Each machine is reported once.
pub fn machines_using(network: &str, machines: &[MachineRecord]) -> Vec<MachineRecord> {
    let wanted = network.to_lowercase();

    machines
        .iter()
        .filter(|machine| {
            let Some(definition) = machine.definition.as_deref() else {
                return false;
            };
            let domain = match Element::parse(definition) {
                Ok(domain) => domain,
                Err(e) => {
                    debug!(machine = %machine.name, error = %e, "Skipping unparsable description");
                    return false;
                }
            };
            referenced_networks(&domain)
                .iter()
                .any(|name| name.to_lowercase() == wanted)
        })
        .cloned()
        .collect()
}
