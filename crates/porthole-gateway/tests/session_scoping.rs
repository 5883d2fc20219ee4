//! Session-scoping behavior of the gateway against the in-memory backends.

use std::cell::RefCell;
use std::rc::Rc;

use porthole_core::{BackendError, DocData, Error, User};
use porthole_gateway::{Gateway, MemoryIdentity, MemoryStore, ignore_completion};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

fn doc(value: serde_json::Value) -> DocData {
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn setup() -> (Gateway, MemoryIdentity, MemoryStore) {
    let identity = MemoryIdentity::new();
    let store = MemoryStore::seeded(11);
    let gateway = Gateway::builder(identity.clone(), store.clone()).build();
    (gateway, identity, store)
}

#[test]
fn previous_user_data_never_reaches_the_next_session() {
    let (gateway, identity, store) = setup();
    store.insert("users/alice/todos/a1", doc(json!({"id": "a1"})));
    store.insert("users/bob/todos/b1", doc(json!({"id": "b1"})));
    identity.resolve(Some(User::new("alice")));

    let alice_seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&alice_seen);
    gateway
        .subscribe_query("todos", "todos", [], move |r| {
            sink.borrow_mut().push(r.unwrap())
        })
        .unwrap();

    identity.resolve(Some(User::new("bob")));
    // Alice's listener is gone; writes to her collection are not delivered.
    store.insert("users/alice/todos/a2", doc(json!({"id": "a2"})));
    assert_eq!(alice_seen.borrow().len(), 1);

    let bob_seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&bob_seen);
    gateway
        .subscribe_query("todos", "todos", [], move |r| {
            sink.borrow_mut().push(r.unwrap())
        })
        .unwrap();
    assert_eq!(*bob_seen.borrow(), vec![vec![doc(json!({"id": "b1"}))]]);
}

#[test]
fn writes_after_sign_out_are_rejected() {
    let (gateway, identity, store) = setup();
    identity.resolve(Some(User::new("alice")));
    identity.resolve(None);

    assert_eq!(
        gateway.delete_document("todos/a1", ignore_completion()),
        Err(Error::NoActiveSession)
    );
    assert_eq!(store.document_count(), 0);
}

#[test]
fn flush_precedes_listener_notification() {
    let (gateway, identity, _store) = setup();
    identity.resolve(Some(User::new("alice")));

    let order = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&order);
    gateway.dispose_on_session_change(porthole_core::Disposer::new(move || {
        log.borrow_mut().push("flush")
    }));
    let log = Rc::clone(&order);
    let _listener = gateway.on_session_changed(move |_| log.borrow_mut().push("listener"));
    order.borrow_mut().clear();

    identity.resolve(Some(User::new("bob")));
    assert_eq!(*order.borrow(), vec!["flush", "listener"]);
    assert_eq!(gateway.registry().anonymous_len(), 0);
}

#[test]
fn broken_listener_leaves_other_queries_running() {
    let (gateway, identity, store) = setup();
    identity.resolve(Some(User::new("alice")));

    let seen = Rc::new(RefCell::new(Vec::new()));
    for (id, collection) in [("a", "todos"), ("b", "projects")] {
        let sink = Rc::clone(&seen);
        gateway
            .subscribe_query(id, collection, [], move |r| {
                sink.borrow_mut().push((id, r.is_ok()))
            })
            .unwrap();
    }

    store.break_listeners(
        "users/alice/todos",
        BackendError::PermissionDenied("rules changed".into()),
    );
    store.insert("users/alice/projects/p1", doc(json!({"id": "p1"})));

    assert_eq!(
        *seen.borrow(),
        vec![("a", true), ("b", true), ("a", false), ("b", true)]
    );
    assert_eq!(gateway.live_query_count(), 2);
    assert_eq!(store.active_listeners(), 2);
}

#[test]
fn failed_sign_in_leaves_session_unchanged() {
    let (gateway, identity, _store) = setup();
    identity.resolve(Some(User::new("alice")));
    identity.sign_in_as(User::new("bob"));
    identity.fail_next(BackendError::Unavailable("offline".into()));

    let outcome = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);
    gateway.sign_in(Box::new(move |r| *sink.borrow_mut() = Some(r)));

    assert_eq!(
        *outcome.borrow(),
        Some(Err(BackendError::Unavailable("offline".into())))
    );
    assert_eq!(gateway.current_session().uid(), Some("alice"));
    assert_eq!(gateway.transition_count(), 1);

    // The failure is consumed; the next attempt goes through.
    gateway.sign_in(ignore_completion());
    assert_eq!(gateway.current_session().uid(), Some("bob"));
}

#[derive(Debug, Clone)]
enum Step {
    Subscribe(u8),
    Unsubscribe(u8),
    SwitchUser(u8),
    SignOut,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..4).prop_map(Step::Subscribe),
        (0u8..4).prop_map(Step::Unsubscribe),
        (0u8..3).prop_map(Step::SwitchUser),
        Just(Step::SignOut),
    ]
}

proptest! {
    #[test]
    fn listeners_and_teardowns_stay_balanced(steps in prop::collection::vec(step(), 1..40)) {
        let (gateway, identity, store) = setup();
        identity.resolve(Some(User::new("u0")));

        for step in steps {
            match step {
                Step::Subscribe(id) => {
                    let _ = gateway.subscribe_query(&format!("q{id}"), "todos", [], |_| {});
                }
                Step::Unsubscribe(id) => {
                    gateway.unsubscribe_query(&format!("q{id}"));
                }
                Step::SwitchUser(uid) => identity.resolve(Some(User::new(format!("u{uid}")))),
                Step::SignOut => identity.resolve(None),
            }
            // One live listener per id, and every opened listener is either
            // live or torn down exactly once.
            prop_assert_eq!(store.active_listeners(), gateway.live_query_count());
            prop_assert!(gateway.registry().anonymous_len() <= 1);
            prop_assert_eq!(
                store.opened_listeners(),
                store.active_listeners() + store.teardowns()
            );
        }

        gateway.shutdown();
        prop_assert_eq!(store.active_listeners(), 0);
    }
}
