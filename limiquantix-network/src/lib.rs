//! # limiquantix Network
//!
//! Nuage network registry and libvirt interface reconciler.
//!
//! This crate provides both halves of the Nuage integration:
//! - **Registry** (hypervisor side) - named `nuage_network` definitions with
//!   uniqueness, referential-integrity and update propagation
//! - **Reconciler** (machine side) - rewrites a domain's interfaces onto the
//!   OVS/VRS bridge and records the bindings in `metadata/nuage`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Request Dispatch              │
//! │  (create, delete, update, get, names)   │
//! └─────────────────────┬───────────────────┘
//!                       │
//!                       ▼
//! ┌───────────────────────────────────────┐      ┌──────────────────┐
//! │            NetworkRegistry            │─────▶│  NetworkStore    │
//! │  (write gate, scan, propagate)        │      │  (SQLite)        │
//! └──────────┬─────────────────┬──────────┘      └──────────────────┘
//!            │ scan            │ redefine
//!            ▼                 ▼
//! ┌───────────────────┐ ┌───────────────────┐
//! │ MachineInventory  │ │  MachineDefiner   │──▶ DefinitionHook
//! │ (mock / libvirt)  │ │ (mock / libvirt)  │    (Reconciler)
//! └───────────────────┘ └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use limiquantix_network::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hypervisor = Arc::new(MockHypervisor::new());
//!     let store = NetworkStore::open("/tmp/networks.db").await.unwrap();
//!     let registry = Arc::new(NetworkRegistry::new(
//!         store,
//!         hypervisor.clone(),
//!         hypervisor.clone(),
//!         Arc::new(EventBus::new()),
//!     ));
//!
//!     hypervisor
//!         .add_definition_hook(Arc::new(NuageDefinitionHook::new(
//!             Reconciler::default(),
//!             registry.clone(),
//!         )))
//!         .unwrap();
//!
//!     let net = NetworkDefinition::parse(None, r#"<nuage_network name="net1"/>"#).unwrap();
//!     registry.create(net).await.unwrap();
//! }
//! ```

pub mod error;
pub mod events;
pub mod hook;
pub mod libvirt;
pub mod mock;
pub mod network;
pub mod permissions;
pub mod reconciler;
pub mod registry;
pub mod scanner;
pub mod service;
pub mod store;
pub mod traits;
pub mod types;
pub mod xml;

pub use error::{NetworkError, Result};
pub use events::{EventBus, NetworkEvent};
pub use hook::NuageDefinitionHook;
pub use mock::MockHypervisor;
pub use network::{InterfaceBinding, NetworkDefinition, OvsBridge};
pub use permissions::{PermissionSpec, StaticPermissionGate};
pub use reconciler::Reconciler;
pub use registry::NetworkRegistry;
pub use service::{
    ErrorReply, HypervisorHandlers, MachineHandlers, NetworkAction, NetworkEntry, NetworkReply,
    NetworkRequest, RequestHandler,
};
pub use store::NetworkStore;
pub use traits::{
    ChangeNotifier, DefinitionHook, MachineDefiner, MachineInventory, NetworkCatalog,
    NetworkLookup, PermissionGate,
};
pub use types::*;
pub use xml::Element;

#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtInventory;
