#![forbid(unsafe_code)]

//! Host composition: typed dispatch of every registry channel.
//!
//! [`Host::start`] wires one handler per [`FromAppChannel`] and one emitter per
//! [`ToAppChannel`] through a [`PortBridge`], then forwards decoded messages to
//! the gateway, the persistence adapter and the layout probe.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Payload does not decode | warning, `malformed` incremented, message dropped |
//! | Request rejected (no session, blank name) | warning, nothing sent to the backend |
//! | Backend write or auth failure | warning from the completion |
//! | Storage write failure | warning |
//! | Query listener failure | warning, no response for that snapshot |

use std::cell::Cell;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use web_time::{SystemTime, UNIX_EPOCH};

use porthole_core::message::QueryResponse;
use porthole_core::{BackendError, Disposer, FromAppChannel, FromAppMsg, SessionState, ToAppChannel, ToAppMsg};
use porthole_gateway::{Completion, Gateway};
use porthole_store::{LocalStore, StorageBackend, StorageKeys};

use crate::bridge::{DeliveryStats, Emitter, PortBridge, WiringReport};
use crate::layout::{self, LayoutProbe};
use crate::port::AppPorts;

/// Everything the host drives besides the application's ports.
pub struct HostParts {
    pub gateway: Gateway,
    pub storage: Rc<dyn StorageBackend>,
    pub layout: Rc<dyn LayoutProbe>,
    pub storage_keys: StorageKeys,
}

/// Typed emitters for the host → application channels.
#[derive(Debug, Clone)]
struct Outbound {
    auth: Emitter,
    query: Emitter,
    rects: Emitter,
}

impl Outbound {
    fn send(&self, msg: &ToAppMsg) -> bool {
        let emitter = match msg.channel() {
            ToAppChannel::OnAuthStateChanged => &self.auth,
            ToAppChannel::OnFirestoreQueryResponse => &self.query,
            ToAppChannel::GotBoundingClientRects => &self.rects,
        };
        match msg.encode() {
            Ok(value) => emitter.emit(value),
            Err(err) => {
                warn!(error = %err, "dropping unencodable message");
                false
            }
        }
    }
}

struct Dispatcher {
    gateway: Gateway,
    store: LocalStore<Rc<dyn StorageBackend>>,
    layout: Rc<dyn LayoutProbe>,
    keys: StorageKeys,
    outbound: Outbound,
}

fn report_failure(action: &'static str) -> Completion {
    Box::new(move |result: Result<(), BackendError>| {
        if let Err(err) = result {
            warn!(action, error = %err, "backend operation failed");
        }
    })
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

impl Dispatcher {
    fn dispatch(&self, msg: FromAppMsg) {
        let channel = msg.channel();
        let outcome = match msg {
            FromAppMsg::LocalStorageSetJsonItem { key, value } => {
                self.persist(&key, &value);
                Ok(())
            }
            FromAppMsg::SetCache(value) => {
                self.persist(&self.keys.cache, &value);
                Ok(())
            }
            FromAppMsg::SignIn => {
                self.gateway.sign_in(report_failure("sign-in"));
                Ok(())
            }
            FromAppMsg::SignOut => {
                self.gateway.sign_out(report_failure("sign-out"));
                Ok(())
            }
            FromAppMsg::ChangeTodoTitle { todo_id } => self.change_todo_title(&todo_id),
            FromAppMsg::UpdateDoc(req) => self.gateway.update_document(
                &req.user_doc_path,
                req.data,
                report_failure("update"),
            ),
            FromAppMsg::DeleteDoc(req) => self
                .gateway
                .delete_document(&req.user_doc_path, report_failure("delete")),
            FromAppMsg::AddDoc(req) => self
                .gateway
                .create_document(&req.user_collection_name, req.data, report_failure("create"))
                .map(|id| debug!(%id, "document created")),
            FromAppMsg::Query(req) => {
                let outbound = self.outbound.clone();
                let id = req.id.clone();
                self.gateway.subscribe_query(
                    &req.id,
                    &req.user_collection_name,
                    req.where_clause,
                    move |snapshot| {
                        // Listener failures are logged by the gateway.
                        if let Ok(docs) = snapshot {
                            outbound.send(&ToAppMsg::QueryResponse(QueryResponse {
                                id: id.clone(),
                                doc_data_list: docs,
                            }));
                        }
                    },
                )
            }
            FromAppMsg::DisposeQuery { id } => {
                self.gateway.unsubscribe_query(&id);
                Ok(())
            }
            FromAppMsg::Measure(req) => {
                let response = layout::measure(&*self.layout, &req);
                self.outbound.send(&ToAppMsg::Rects(response));
                Ok(())
            }
        };
        if let Err(err) = outcome {
            warn!(port = %channel, error = %err, "request rejected");
        }
    }

    fn persist(&self, key: &str, value: &Value) {
        if let Err(err) = self.store.write_json(key, value) {
            warn!(key, error = %err, "failed to persist value");
        }
    }

    fn change_todo_title(&self, todo_id: &str) -> porthole_core::Result<()> {
        let Some(title) = self.gateway.placeholder_title("todos") else {
            debug!(todo_id, "no title policy configured, ignoring");
            return Ok(());
        };
        let mut data = Map::new();
        data.insert("title".into(), Value::String(title));
        data.insert("modifiedAt".into(), Value::from(now_millis()));
        self.gateway.update_document(
            &format!("todos/{}", todo_id.trim()),
            data,
            report_failure("change-title"),
        )
    }
}

/// A running host attached to one application.
pub struct Host {
    gateway: Gateway,
    bridge: PortBridge,
    report: WiringReport,
    session_listener: Option<Disposer>,
    stopped: Cell<bool>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("gateway", &self.gateway)
            .field("bridge", &self.bridge)
            .field("stopped", &self.stopped.get())
            .finish()
    }
}

impl Host {
    /// Wire `ports` to `parts` and start forwarding.
    pub fn start(ports: Rc<dyn AppPorts>, parts: HostParts) -> Self {
        let mut bridge = PortBridge::new(ports);
        for channel in ToAppChannel::ALL {
            bridge.declare_emitter(channel.name());
        }
        let outbound = Outbound {
            auth: bridge.emitter(ToAppChannel::OnAuthStateChanged.name()),
            query: bridge.emitter(ToAppChannel::OnFirestoreQueryResponse.name()),
            rects: bridge.emitter(ToAppChannel::GotBoundingClientRects.name()),
        };

        let dispatcher = Rc::new(Dispatcher {
            gateway: parts.gateway.clone(),
            store: LocalStore::new(parts.storage),
            layout: parts.layout,
            keys: parts.storage_keys,
            outbound: outbound.clone(),
        });
        for channel in FromAppChannel::ALL {
            let dispatcher = Rc::clone(&dispatcher);
            let recorder = bridge.recorder();
            bridge.handle(channel.name(), move |payload| {
                match FromAppMsg::decode(channel, payload) {
                    Ok(msg) => dispatcher.dispatch(msg),
                    Err(err) => {
                        warn!(error = %err, "dropping malformed message");
                        recorder.record_malformed();
                    }
                }
            });
        }

        let report = bridge.attach();
        let session_listener = parts.gateway.on_session_changed(move |state: &SessionState| {
            outbound.send(&ToAppMsg::AuthStateChanged(state.user().cloned()));
        });
        info!(
            subscribed = report.subscribed.len(),
            clean = report.is_clean(),
            "host started"
        );

        Self {
            gateway: parts.gateway,
            bridge,
            report,
            session_listener: Some(session_listener),
            stopped: Cell::new(false),
        }
    }

    /// Wiring outcome of [`start`](Self::start).
    #[must_use]
    pub fn report(&self) -> &WiringReport {
        &self.report
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        self.bridge.stats()
    }

    /// Detach from the application and release every resource. Idempotent.
    pub fn shutdown(&mut self) {
        if self.stopped.replace(true) {
            return;
        }
        if let Some(listener) = self.session_listener.take() {
            listener.dispose();
        }
        let ports = self.bridge.detach();
        let released = self.gateway.shutdown();
        info!(ports, released, "host stopped");
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StaticLayout;
    use crate::port::PortTable;
    use porthole_core::User;
    use porthole_gateway::{MemoryIdentity, MemoryStore, PlaceholderTitles};
    use porthole_store::MemoryStorage;
    use serde_json::json;
    use std::cell::RefCell;

    struct Fixture {
        app: PortTable,
        identity: MemoryIdentity,
        store: MemoryStore,
        storage: MemoryStorage,
        received: Rc<RefCell<Vec<(String, Value)>>>,
        host: Host,
    }

    fn fixture() -> Fixture {
        let app = PortTable::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        for channel in FromAppChannel::ALL {
            app.declare_outgoing(channel.name());
        }
        for channel in ToAppChannel::ALL {
            let sink = Rc::clone(&received);
            app.declare_incoming(channel.name(), move |v| {
                sink.borrow_mut().push((channel.name().to_owned(), v));
            });
        }
        let identity = MemoryIdentity::new();
        let store = MemoryStore::seeded(3);
        let storage = MemoryStorage::new();
        let gateway = Gateway::builder(identity.clone(), store.clone())
            .defaults(PlaceholderTitles::seeded(3))
            .build();
        let host = Host::start(
            Rc::new(app.clone()),
            HostParts {
                gateway,
                storage: Rc::new(storage.clone()),
                layout: Rc::new(StaticLayout::default()),
                storage_keys: StorageKeys::default(),
            },
        );
        Fixture {
            app,
            identity,
            store,
            storage,
            received,
            host,
        }
    }

    #[test]
    fn full_registry_wires_cleanly() {
        let f = fixture();
        assert!(f.host.report().is_clean(), "{:?}", f.host.report());
        assert_eq!(f.host.report().subscribed.len(), FromAppChannel::ALL.len());
    }

    #[test]
    fn auth_changes_reach_the_app() {
        let f = fixture();
        f.identity.resolve(Some(User::new("u1")));
        f.identity.resolve(None);
        assert_eq!(
            *f.received.borrow(),
            vec![
                ("onAuthStateChanged".to_owned(), json!({"uid": "u1", "displayName": null, "email": null, "photoURL": null})),
                ("onAuthStateChanged".to_owned(), Value::Null),
            ]
        );
    }

    #[test]
    fn cache_and_arbitrary_keys_persist() {
        let f = fixture();
        f.app.publish("setCache", json!({"count": 3})).unwrap();
        f.app
            .publish("localStorageSetJsonItem", json!(["cachedTodoList", [1, 2]]))
            .unwrap();
        assert_eq!(f.storage.raw("appCache").as_deref(), Some("{\"count\":3}"));
        assert_eq!(f.storage.raw("cachedTodoList").as_deref(), Some("[1,2]"));

        f.app.publish("setCache", Value::Null).unwrap();
        assert_eq!(f.storage.raw("appCache"), None);
    }

    #[test]
    fn query_responses_carry_the_request_id() {
        let f = fixture();
        f.identity.resolve(Some(User::new("u1")));
        f.received.borrow_mut().clear();

        f.app
            .publish(
                "queryFirestore",
                json!({"id": "open", "userCollectionName": "todos", "whereClause": [["done", "==", false]]}),
            )
            .unwrap();
        f.app
            .publish(
                "addFirestoreDoc",
                json!({"userCollectionName": "todos", "data": {"title": "x", "done": false}}),
            )
            .unwrap();

        let received = f.received.borrow();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].1, json!({"id": "open", "docDataList": []}));
        assert_eq!(received[1].1["docDataList"][0]["title"], json!("x"));
    }

    #[test]
    fn change_todo_title_updates_existing_doc() {
        let f = fixture();
        f.identity.resolve(Some(User::new("u1")));
        f.store.insert("users/u1/todos/t1", Map::from_iter([("title".to_owned(), json!("old"))]));

        f.app.publish("changeTodoTitle", json!("t1")).unwrap();

        let doc = f.store.document("users/u1/todos/t1").unwrap();
        assert_ne!(doc["title"], json!("old"));
        assert!(doc["modifiedAt"].as_u64().is_some());
    }

    #[test]
    fn malformed_payloads_are_counted_not_dispatched() {
        let f = fixture();
        f.identity.resolve(Some(User::new("u1")));
        f.app.publish("queryFirestore", json!("not an object")).unwrap();
        assert_eq!(f.host.stats().malformed, 1);
        assert_eq!(f.store.opened_listeners(), 0);
    }

    #[test]
    fn shutdown_is_idempotent_and_releases_queries() {
        let mut f = fixture();
        f.identity.resolve(Some(User::new("u1")));
        f.app
            .publish("queryFirestore", json!({"id": "q", "userCollectionName": "todos"}))
            .unwrap();
        assert_eq!(f.store.active_listeners(), 1);

        f.host.shutdown();
        f.host.shutdown();
        assert_eq!(f.store.active_listeners(), 0);
        assert_eq!(f.app.subscriber_count("signIn"), 0);
    }
}
