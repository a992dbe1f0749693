//! Metadata reconciler: binds domain interfaces to Nuage networks.
//!
//! A pass works on a copy of the description:
//!
//! 1. prior bindings are read from the existing `metadata/nuage` block,
//! 2. every interface is classified (explicit `type="nuage"` request,
//!    previously bound, or unmanaged),
//! 3. every network needed by the pass is resolved,
//! 4. only then is the copy rewritten and the `nuage` block rebuilt.
//!
//! Any resolution failure aborts before step 4, so callers either get a fully
//! reconciled description or an error.

use std::collections::HashMap;

use tracing::{debug, info, instrument, warn};

use crate::error::{NetworkError, Result};
use crate::network::{
    interface_mac, interface_target_dev, strip_registry_namespace, target_dev_for_mac,
    InterfaceBinding, NetworkDefinition, OvsBridge,
};
use crate::traits::NetworkLookup;
use crate::types::{
    OwnerIdentity, METADATA_NAMESPACE, NETWORK_ELEMENT, NUAGE_ELEMENT, NUAGE_INTERFACE_IP_ATTR,
    NUAGE_INTERFACE_TYPE, NUAGE_NETWORK_NAME_ATTR,
};
use crate::xml::Element;

/// An interface selected for binding, by position under `<devices>`.
#[derive(Debug, Clone)]
struct PlannedBinding {
    index: usize,
    binding: InterfaceBinding,
}

/// Rewrites domain interfaces and the `nuage` metadata block.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    bridge: OvsBridge,
}

impl Reconciler {
    pub fn new(bridge: OvsBridge) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &OvsBridge {
        &self.bridge
    }

    /// Bindings recorded by a previous pass, keyed by lower-case MAC. The
    /// bindings themselves keep the MAC as recorded.
    ///
    /// Entries without an `interface` child, a MAC or a network name are
    /// ignored.
    pub fn prior_bindings(domain: &Element) -> HashMap<String, InterfaceBinding> {
        let mut bindings = HashMap::new();

        let networks = domain
            .child("metadata")
            .into_iter()
            .flat_map(|metadata| metadata.children_named(NUAGE_ELEMENT))
            .flat_map(|nuage| nuage.children_named(NETWORK_ELEMENT));

        for network in networks {
            let Some(interface) = network.child("interface") else {
                continue;
            };
            let Some(mac) = interface.attr("mac").filter(|m| !m.is_empty()) else {
                continue;
            };
            let Some(name) = network.attr("name") else {
                continue;
            };

            bindings.insert(
                mac.to_lowercase(),
                InterfaceBinding::new(mac, name, interface.attr("address").map(str::to_string)),
            );
        }

        bindings
    }

    /// Reconcile `domain` for a machine owned by `owner`.
    ///
    /// Without an owner the description is returned unchanged.
    #[instrument(skip_all, fields(bridge = %self.bridge.name()))]
    pub async fn reconcile(
        &self,
        domain: &Element,
        owner: Option<&OwnerIdentity>,
        lookup: &dyn NetworkLookup,
    ) -> Result<Element> {
        let Some(owner) = owner else {
            debug!("No owner identity, leaving description untouched");
            return Ok(domain.clone());
        };

        let prior = Self::prior_bindings(domain);
        let plan = self.plan(domain, &prior);
        let resolved = Self::resolve(&plan, lookup).await?;

        let mut reconciled = domain.clone();
        let mut nuage = Self::header(owner);

        if let Some(devices) = reconciled.child_mut("devices") {
            for planned in &plan {
                let interface = &mut devices.children[planned.index];
                self.bridge.bind_interface(interface, &planned.binding.mac_address);

                let definition = &resolved[&planned.binding.network_name];
                nuage.push_child(Self::network_copy(definition, &planned.binding));
            }
        }

        let metadata = reconciled.ensure_child("metadata");
        metadata.remove_children(NUAGE_ELEMENT);
        metadata.push_child(nuage);

        info!(
            prior_bindings = prior.len(),
            bound_interfaces = plan.len(),
            "Reconciled interface bindings"
        );

        Ok(reconciled)
    }

    /// Classify interfaces in document order.
    fn plan(
        &self,
        domain: &Element,
        prior: &HashMap<String, InterfaceBinding>,
    ) -> Vec<PlannedBinding> {
        let Some(devices) = domain.child("devices") else {
            return Vec::new();
        };

        let mut plan = Vec::new();
        for (index, interface) in devices.children.iter().enumerate() {
            if interface.name != "interface" {
                continue;
            }

            if interface.attr("type") == Some(NUAGE_INTERFACE_TYPE) {
                let mac = interface_mac(interface);
                let network = interface
                    .attr(NUAGE_NETWORK_NAME_ATTR)
                    .filter(|n| !n.is_empty());

                match (mac, network) {
                    (Some(mac), Some(network)) => plan.push(PlannedBinding {
                        index,
                        binding: InterfaceBinding::new(
                            mac,
                            network,
                            interface.attr(NUAGE_INTERFACE_IP_ATTR).map(str::to_string),
                        ),
                    }),
                    _ => warn!(
                        index,
                        mac = ?mac,
                        network = ?network,
                        "Nuage interface lacks a MAC or network name, skipping"
                    ),
                }
                continue;
            }

            let Some(mac) = interface_mac(interface) else {
                continue;
            };
            let Some(previous) = prior.get(&mac.to_lowercase()) else {
                continue;
            };

            let expected = target_dev_for_mac(mac);
            match interface_target_dev(interface) {
                Some(dev) if dev == expected => {}
                other => {
                    debug!(
                        mac = %mac,
                        target_dev = ?other,
                        "Interface target does not match a Nuage binding, leaving it alone"
                    );
                    continue;
                }
            }

            plan.push(PlannedBinding {
                index,
                binding: InterfaceBinding::new(
                    mac,
                    previous.network_name.as_str(),
                    previous.address.clone(),
                ),
            });
        }

        plan
    }

    /// Resolve every network the plan needs, once per name.
    async fn resolve(
        plan: &[PlannedBinding],
        lookup: &dyn NetworkLookup,
    ) -> Result<HashMap<String, NetworkDefinition>> {
        let mut resolved = HashMap::new();

        for planned in plan {
            let name = &planned.binding.network_name;
            if resolved.contains_key(name) {
                continue;
            }

            let definition = lookup.lookup(name).await.map_err(|e| {
                warn!(network = %name, error = %e, "Failed to resolve bound network");
                NetworkError::NetworkNotFound {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            resolved.insert(name.clone(), definition);
        }

        Ok(resolved)
    }

    fn header(owner: &OwnerIdentity) -> Element {
        Element::new(NUAGE_ELEMENT)
            .with_attr("xmlns", METADATA_NAMESPACE)
            .with_child(Element::new("user").with_attr("name", owner.user.as_str()))
            .with_child(Element::new("enterprise").with_attr("name", owner.organization.as_str()))
            .with_child(Element::new("application").with_attr("name", owner.application.as_str()))
    }

    /// Private copy of a definition stamped with the bound interface.
    fn network_copy(definition: &NetworkDefinition, binding: &InterfaceBinding) -> Element {
        let mut copy = definition.document.clone();
        strip_registry_namespace(&mut copy);
        copy.remove_children("interface");

        let mut interface =
            Element::new("interface").with_attr("mac", binding.mac_address.as_str());
        if let Some(address) = &binding.address {
            interface.set_attr("address", address.as_str());
        }
        copy.push_child(interface);
        copy
    }
}
