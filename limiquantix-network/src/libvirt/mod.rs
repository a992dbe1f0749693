//! Libvirt machine inventory.
//!
//! Lists the hypervisor's domains for the reference scanner and redefines
//! them through libvirt, running the definition hooks first. Requires the
//! `libvirt` feature and a reachable libvirt daemon.

#[cfg(feature = "libvirt")]
mod inventory;

#[cfg(feature = "libvirt")]
pub use inventory::LibvirtInventory;

use std::fmt::Display;

use tracing::warn;

use crate::types::{MachineRecord, OwnerIdentity, NUAGE_ELEMENT};
use crate::xml::Element;

/// Check if the libvirt inventory is compiled in.
pub fn is_available() -> bool {
    cfg!(feature = "libvirt")
}

/// Owner labels recorded in a domain's `metadata/nuage` block.
///
/// All three labels must be present; a partial block yields `None`.
pub fn owner_from_metadata(domain: &Element) -> Option<OwnerIdentity> {
    let nuage = domain.child("metadata")?.child(NUAGE_ELEMENT)?;
    let label = |name: &str| {
        nuage
            .child(name)
            .and_then(|e| e.attr("name"))
            .map(str::to_string)
    };

    Some(OwnerIdentity::new(
        label("user")?,
        label("enterprise")?,
        label("application")?,
    ))
}

/// Keep the records that could be read; one bad domain never hides the rest.
#[cfg_attr(not(feature = "libvirt"), allow(dead_code))]
pub(crate) fn readable_records<E: Display>(
    records: impl IntoIterator<Item = Result<MachineRecord, E>>,
) -> Vec<MachineRecord> {
    records
        .into_iter()
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable domain");
                None
            }
        })
        .collect()
}
