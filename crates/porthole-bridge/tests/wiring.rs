//! Composition-time wiring checks against partial and misdeclared apps.

use std::rc::Rc;

use porthole_bridge::{Host, HostParts, PortTable, StaticLayout};
use porthole_core::{Direction, WiringDiagnostic};
use porthole_gateway::{Gateway, MemoryIdentity, MemoryStore};
use porthole_store::{MemoryStorage, StorageKeys};
use serde_json::json;

fn start(app: &PortTable) -> Host {
    let gateway = Gateway::builder(MemoryIdentity::new(), MemoryStore::new()).build();
    Host::start(
        Rc::new(app.clone()),
        HostParts {
            gateway,
            storage: Rc::new(MemoryStorage::new()),
            layout: Rc::new(StaticLayout::default()),
            storage_keys: StorageKeys::default(),
        },
    )
}

#[test]
fn partial_app_gets_diagnostics_not_errors() {
    let app = PortTable::new();
    app.declare_outgoing("signIn")
        .declare_outgoing("legacyPort")
        .declare_incoming("onAuthStateChanged", |_| {});

    let host = start(&app);
    let report = host.report();

    assert_eq!(report.subscribed, vec!["signIn"]);
    assert_eq!(report.missing_handlers, vec!["legacyPort"]);
    assert!(report.not_found.contains(&"signOut".to_owned()));
    assert!(report.unreachable_emitters.contains(&"gotBoundingClientRects".to_owned()));
    assert!(report.diagnostics.contains(&WiringDiagnostic::Unknown {
        name: "legacyPort".into(),
        direction: Direction::FromApp,
    }));
}

#[test]
fn direction_mismatch_is_diagnosed() {
    let app = PortTable::new();
    app.declare_incoming("signIn", |_| {});

    let host = start(&app);
    assert!(host.report().diagnostics.contains(&WiringDiagnostic::DirectionMismatch {
        name: "signIn".into(),
        declared: Direction::ToApp,
        expected: Direction::FromApp,
    }));
}

#[test]
fn undeclared_publish_reaches_no_handler() {
    let app = PortTable::new();
    app.declare_outgoing("setCache");
    let host = start(&app);

    assert!(app.publish("somethingElse", json!(1)).is_err());
    assert_eq!(host.stats().received, 0);
}
