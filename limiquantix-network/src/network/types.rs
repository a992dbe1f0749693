//! Network definition and interface binding types.

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};
use crate::types::{NETWORK_ELEMENT, REGISTRY_NAMESPACE};
use crate::xml::Element;

/// A named Nuage network definition as held by the registry.
///
/// The document is an opaque `nuage_network` element (type, domain, zone,
/// bandwidth, subnet...). Only its `name` attribute is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    pub name: String,
    pub document: Element,
}

impl NetworkDefinition {
    /// Validate a definition document and bind it to a registry name.
    ///
    /// When `name` is `None` the document's own `name` attribute is used.
    /// When both are present they must agree. The registry namespace
    /// declaration is dropped so stored copies embed cleanly into machine
    /// metadata.
    pub fn from_document(name: Option<&str>, mut document: Element) -> Result<Self> {
        if document.name != NETWORK_ELEMENT {
            return Err(NetworkError::MalformedInput(format!(
                "expected <{}> definition, got <{}>",
                NETWORK_ELEMENT, document.name
            )));
        }

        let name = match (name, document.attr("name")) {
            (Some(requested), Some(declared)) if requested != declared => {
                return Err(NetworkError::MalformedInput(format!(
                    "definition is named '{}' but was submitted as '{}'",
                    declared, requested
                )));
            }
            (Some(requested), _) => requested.to_string(),
            (None, Some(declared)) => declared.to_string(),
            (None, None) => {
                return Err(NetworkError::MalformedInput(
                    "network definition has no name".to_string(),
                ));
            }
        };

        if name.trim().is_empty() {
            return Err(NetworkError::MalformedInput(
                "network name must not be blank".to_string(),
            ));
        }

        document.set_attr("name", name.as_str());
        strip_registry_namespace(&mut document);

        Ok(Self { name, document })
    }

    /// Parse and validate a definition from its XML form.
    pub fn parse(name: Option<&str>, xml: &str) -> Result<Self> {
        Self::from_document(name, Element::parse(xml)?)
    }

    pub fn to_xml(&self) -> Result<String> {
        self.document.to_xml()
    }
}

/// Drop the registry's namespace declaration from a definition element.
pub fn strip_registry_namespace(document: &mut Element) {
    if document.attr("xmlns") == Some(REGISTRY_NAMESPACE) {
        document.remove_attr("xmlns");
    }
}

/// The association of one machine interface to one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceBinding {
    /// Interface MAC address
    pub mac_address: String,
    /// Bound network name
    pub network_name: String,
    /// Requested fixed address, if any
    pub address: Option<String>,
}

impl InterfaceBinding {
    pub fn new(
        mac_address: impl Into<String>,
        network_name: impl Into<String>,
        address: Option<String>,
    ) -> Self {
        Self {
            mac_address: mac_address.into(),
            network_name: network_name.into(),
            address: address.filter(|a| !a.is_empty()),
        }
    }
}
