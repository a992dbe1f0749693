//! Integration tests for the network registry.
//!
//! These tests wire the registry, the reconciling hook and the mock
//! hypervisor together over an on-disk SQLite store.

use std::sync::Arc;

use limiquantix_network::{
    Element, EventBus, HypervisorHandlers, MachineRecord, MockHypervisor, NetworkAction,
    NetworkDefinition, NetworkError, NetworkRegistry, NetworkReply, NetworkRequest,
    NetworkStore, NuageDefinitionHook, OwnerIdentity, Reconciler, RequestHandler,
    StaticPermissionGate,
};
use tempfile::TempDir;

struct Harness {
    hypervisor: Arc<MockHypervisor>,
    registry: Arc<NetworkRegistry>,
    events: Arc<EventBus>,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = NetworkStore::open(dir.path().join("networks.db"))
        .await
        .expect("Failed to open store");

    let hypervisor = Arc::new(MockHypervisor::new());
    let events = Arc::new(EventBus::new());
    let registry = Arc::new(NetworkRegistry::new(
        store,
        hypervisor.clone(),
        hypervisor.clone(),
        events.clone(),
    ));

    hypervisor
        .add_definition_hook(Arc::new(NuageDefinitionHook::new(
            Reconciler::default(),
            registry.clone(),
        )))
        .unwrap();

    Harness {
        hypervisor,
        registry,
        events,
        _dir: dir,
    }
}

fn network(name: &str, zone: &str) -> NetworkDefinition {
    NetworkDefinition::parse(
        None,
        &format!(
            r#"<nuage_network xmlns="archipel:hypervisor:nuage:network" name="{name}" type="ipv4" domain="d1" zone="{zone}">
                 <subnet address="10.0.0.0" netmask="255.255.255.0" gateway="10.0.0.1"/>
               </nuage_network>"#
        ),
    )
    .unwrap()
}

fn owner() -> OwnerIdentity {
    OwnerIdentity::new("alice", "acme", "web")
}

fn explicit_domain(name: &str, mac: &str, network: &str) -> String {
    format!(
        r#"<domain type='kvm'>
  <name>{name}</name>
  <devices>
    <interface type='nuage' nuage_network_name='{network}'>
      <mac address='{mac}'/>
      <model type='virtio'/>
    </interface>
  </devices>
</domain>"#
    )
}

/// Add an owned machine and define it through the hooks.
async fn define_machine(h: &Harness, id: &str, name: &str, mac: &str, network: &str) {
    h.hypervisor
        .add_machine(MachineRecord::new(id, name).with_owner(owner()))
        .unwrap();
    h.hypervisor
        .define(id, &explicit_domain(name, mac, network))
        .await
        .unwrap();
}

fn bound_zone(xml: &str) -> Option<String> {
    let domain = Element::parse(xml).unwrap();
    domain
        .child("metadata")?
        .child("nuage")?
        .child("nuage_network")?
        .attr("zone")
        .map(str::to_string)
}

#[tokio::test]
async fn test_names_are_unique() {
    let h = harness().await;

    h.registry.create(network("net1", "z1")).await.unwrap();
    let err = h.registry.create(network("net1", "z2")).await.unwrap_err();
    assert!(matches!(err, NetworkError::DuplicateName(name) if name == "net1"));

    // The first definition survives
    let stored = h.registry.get("net1").await.unwrap();
    assert_eq!(stored.document.attr("zone"), Some("z1"));
    assert_eq!(h.registry.list_names().await.unwrap(), vec!["net1".to_string()]);
}

#[tokio::test]
async fn test_stored_definition_drops_registry_namespace() {
    let h = harness().await;
    h.registry.create(network("net1", "z1")).await.unwrap();

    let stored = h.registry.get("net1").await.unwrap();
    assert_eq!(stored.document.attr("xmlns"), None);
    assert_eq!(stored.document.child("subnet").and_then(|s| s.attr("gateway")), Some("10.0.0.1"));
}

#[tokio::test]
async fn test_referential_guard() {
    let h = harness().await;
    h.registry.create(network("net1", "z1")).await.unwrap();
    define_machine(&h, "m1", "vm1", "00:11:22:33:44:55", "net1").await;

    let stored = h.hypervisor.definition("m1").unwrap();
    assert!(stored.contains(r#"<target dev="001122334455"/>"#));
    assert!(stored.contains(r#"mac="00:11:22:33:44:55""#));

    let err = h.registry.delete("net1").await.unwrap_err();
    match &err {
        NetworkError::NetworkInUse { name, machines } => {
            assert_eq!(name, "net1");
            assert_eq!(machines, &vec!["vm1".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains(" - vm1\n"));
    assert!(h.registry.get("net1").await.is_ok());

    // Drop the interface; the next definition no longer references net1
    h.hypervisor
        .define("m1", "<domain type='kvm'><name>vm1</name><devices/></domain>")
        .await
        .unwrap();
    h.registry.delete("net1").await.unwrap();

    assert!(matches!(
        h.registry.get("net1").await,
        Err(NetworkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_in_use_matching_ignores_case() {
    let h = harness().await;
    h.registry.create(network("net1", "z1")).await.unwrap();

    // Recorded under a different case by some earlier tooling
    h.hypervisor
        .add_machine(MachineRecord::new("m1", "vm1").with_definition(
            r#"<domain><name>vm1</name><metadata>
                 <nuage xmlns="http://www.nuagenetworks.net/2013/Vm/Metadata">
                   <nuage_network name="NET1"><interface mac="00:11:22:33:44:55"/></nuage_network>
                 </nuage>
               </metadata></domain>"#,
        ))
        .unwrap();

    let err = h.registry.delete("net1").await.unwrap_err();
    assert!(matches!(err, NetworkError::NetworkInUse { .. }));
}

#[tokio::test]
async fn test_delete_unknown_network() {
    let h = harness().await;
    let err = h.registry.delete("missing").await.unwrap_err();
    assert!(matches!(err, NetworkError::NotFound(name) if name == "missing"));
}

#[tokio::test]
async fn test_update_redefines_each_user_once() {
    let h = harness().await;
    h.registry.create(network("net1", "z1")).await.unwrap();
    h.registry.create(network("net2", "z1")).await.unwrap();

    define_machine(&h, "m1", "vm1", "00:11:22:33:44:01", "net1").await;
    define_machine(&h, "m2", "vm2", "00:11:22:33:44:02", "net1").await;
    define_machine(&h, "m3", "vm3", "00:11:22:33:44:03", "net2").await;
    h.hypervisor.add_machine(MachineRecord::new("m4", "vm4")).unwrap();

    h.registry.update(network("net1", "z2")).await.unwrap();

    let mut redefined = h.hypervisor.redefinitions();
    redefined.sort();
    assert_eq!(redefined, vec!["m1".to_string(), "m2".to_string()]);

    // Re-definition re-ran the reconciler with the new definition
    assert_eq!(bound_zone(&h.hypervisor.definition("m1").unwrap()).as_deref(), Some("z2"));
    assert_eq!(bound_zone(&h.hypervisor.definition("m2").unwrap()).as_deref(), Some("z2"));
    assert_eq!(bound_zone(&h.hypervisor.definition("m3").unwrap()).as_deref(), Some("z1"));
}

#[tokio::test]
async fn test_update_unknown_network() {
    let h = harness().await;
    let err = h.registry.update(network("ghost", "z1")).await.unwrap_err();
    assert!(matches!(err, NetworkError::NotFound(_)));
    assert!(h.hypervisor.redefinitions().is_empty());
}

#[tokio::test]
async fn test_update_reports_failed_redefinitions() {
    let h = harness().await;
    h.registry.create(network("net1", "z1")).await.unwrap();

    // Referenced in metadata but the persisted description is then made
    // unreconcilable: its prior binding points at a network that is gone.
    let original = r#"<domain><name>vm1</name>
                         <devices>
                           <interface type='nuage' nuage_network_name='net9'>
                             <mac address='00:11:22:33:44:09'/>
                           </interface>
                         </devices>
                         <metadata><nuage><nuage_network name="net1"/></nuage></metadata>
                       </domain>"#;
    h.hypervisor
        .add_machine(
            MachineRecord::new("m1", "vm1")
                .with_owner(owner())
                .with_definition(original),
        )
        .unwrap();

    let err = h.registry.update(network("net1", "z2")).await.unwrap_err();
    match err {
        NetworkError::PropagationFailed { name, machines } => {
            assert_eq!(name, "net1");
            assert_eq!(machines, vec!["vm1".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // The update itself was committed
    let stored = h.registry.get("net1").await.unwrap();
    assert_eq!(stored.document.attr("zone"), Some("z2"));

    // The failed redefinition left the machine's description alone
    assert_eq!(h.hypervisor.definition("m1").as_deref(), Some(original));
}

#[tokio::test]
async fn test_mutations_publish_changes() {
    let h = harness().await;
    let mut rx = h.events.subscribe();

    h.registry.create(network("net1", "z1")).await.unwrap();
    h.registry.update(network("net1", "z2")).await.unwrap();
    h.registry.delete("net1").await.unwrap();
    let _ = h.registry.delete("net1").await;

    let mut changes = Vec::new();
    for _ in 0..3 {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.namespace, "nuagenetwork");
        assert_eq!(event.network, "net1");
        changes.push(event.change);
    }
    assert_eq!(changes, vec!["created", "updated", "deleted"]);
    assert_eq!(h.events.recent().len(), 3);
}

#[tokio::test]
async fn test_dispatch_through_registry() {
    let h = harness().await;
    let handlers = HypervisorHandlers::new(
        h.registry.clone(),
        Arc::new(StaticPermissionGate::allow_all()),
    );

    let create = NetworkRequest::new("admin", NetworkAction::Create)
        .with_definition(r#"<nuage_network name="net1" type="ipv4"/>"#);
    assert_eq!(handlers.handle(create).await.unwrap(), NetworkReply::Done);

    let duplicate = NetworkRequest::new("admin", NetworkAction::Create)
        .with_definition(r#"<nuage_network name="net1"/>"#);
    let err = handlers.handle(duplicate).await.unwrap_err();
    assert_eq!(err.code, -12001);

    define_machine(&h, "m1", "vm1", "00:11:22:33:44:55", "net1").await;
    let err = handlers
        .handle(NetworkRequest::new("admin", NetworkAction::Delete).with_name("net1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, -12002);
    assert!(err.message.contains("vm1"));

    let names = handlers
        .handle(NetworkRequest::new("admin", NetworkAction::GetNames))
        .await
        .unwrap();
    assert_eq!(names, NetworkReply::Names(vec!["net1".to_string()]));

    let err = handlers
        .handle(NetworkRequest::new("admin", NetworkAction::Update).with_name("net1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, -12003);
}

#[tokio::test]
async fn test_denied_request_leaves_registry_untouched() {
    let h = harness().await;
    let handlers = HypervisorHandlers::new(
        h.registry.clone(),
        Arc::new(StaticPermissionGate::new(Default::default())),
    );

    let err = handlers
        .handle(
            NetworkRequest::new("mallory", NetworkAction::Create)
                .with_definition(r#"<nuage_network name="net1"/>"#),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, -12001);
    assert!(err.message.contains("Permission denied"));
    assert!(h.registry.list_names().await.unwrap().is_empty());
}
