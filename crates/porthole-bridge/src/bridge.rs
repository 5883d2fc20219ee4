#![forbid(unsafe_code)]

//! Port bridge: wires host handlers to application ports by name.
//!
//! # Invariants
//!
//! 1. The channel name is the sole join key.
//! 2. Wiring mismatches never fail composition. Each one is logged once at
//!    attach time and listed in the [`WiringReport`].
//! 3. Emission is at-most-once and fire-and-forget: a value for a port the
//!    application does not expose is dropped and counted, never queued.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Handler missing | app emits on a port the host does not handle | warning, port left unsubscribed |
//! | Port not found | host handles a port the app does not emit on | warning, handler never runs |
//! | Subscription refused | app declares a port but rejects the handler | warning, listed as `refused` |
//! | Emit to absent port | app does not listen on the port | warning, `dropped` incremented |

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, debug_span, warn};

use porthole_core::{Direction, Disposer, Error, WiringDiagnostic, channel};

use crate::port::{AppPorts, PortHandler};

// ---------------------------------------------------------------------------
// Delivery accounting
// ---------------------------------------------------------------------------

/// Counters for traffic through the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Messages received from the application and handed to a handler.
    pub received: u64,
    /// Messages delivered to the application.
    pub delivered: u64,
    /// Messages for the application that had no port to go to.
    pub dropped: u64,
    /// Received messages whose payload did not match the channel.
    pub malformed: u64,
}

/// Shared handle for updating [`DeliveryStats`].
#[derive(Debug, Clone, Default)]
pub struct DeliveryRecorder {
    stats: Rc<Cell<DeliveryStats>>,
}

impl DeliveryRecorder {
    fn update(&self, f: impl FnOnce(&mut DeliveryStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    pub fn record_received(&self) {
        self.update(|s| s.received += 1);
    }

    pub fn record_delivered(&self) {
        self.update(|s| s.delivered += 1);
    }

    pub fn record_dropped(&self) {
        self.update(|s| s.dropped += 1);
    }

    pub fn record_malformed(&self) {
        self.update(|s| s.malformed += 1);
    }

    #[must_use]
    pub fn snapshot(&self) -> DeliveryStats {
        self.stats.get()
    }
}

// ---------------------------------------------------------------------------
// Wiring report
// ---------------------------------------------------------------------------

/// Outcome of [`PortBridge::attach`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WiringReport {
    /// Ports with a live subscription.
    pub subscribed: Vec<String>,
    /// Application ports with no host handler.
    pub missing_handlers: Vec<String>,
    /// Host handlers with no application port.
    pub not_found: Vec<String>,
    /// Application ports that were declared but refused a subscription.
    pub refused: Vec<String>,
    /// Emitters with no application port.
    pub unreachable_emitters: Vec<String>,
    /// Differences against the channel registry.
    pub diagnostics: Vec<WiringDiagnostic>,
}

impl WiringReport {
    /// Whether every port lined up.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing_handlers.is_empty()
            && self.not_found.is_empty()
            && self.refused.is_empty()
            && self.unreachable_emitters.is_empty()
            && self.diagnostics.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Sends values to one application port.
///
/// The port is looked up on every call, so an emitter created before the
/// application exposes the port starts working once it does.
#[derive(Clone)]
pub struct Emitter {
    name: Rc<str>,
    ports: Rc<dyn AppPorts>,
    recorder: DeliveryRecorder,
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("name", &self.name).finish()
    }
}

impl Emitter {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver `value`. Returns whether the application had the port.
    pub fn emit(&self, value: Value) -> bool {
        if self.ports.send(&self.name, value) {
            self.recorder.record_delivered();
            true
        } else {
            warn!(port = %self.name, "port not found, dropping message");
            self.recorder.record_dropped();
            false
        }
    }
}

// ---------------------------------------------------------------------------
// PortBridge
// ---------------------------------------------------------------------------

/// Named wiring between host handlers and application ports.
pub struct PortBridge {
    ports: Rc<dyn AppPorts>,
    handlers: BTreeMap<String, PortHandler>,
    emitters: BTreeSet<String>,
    recorder: DeliveryRecorder,
    subscriptions: Vec<Disposer>,
}

impl fmt::Debug for PortBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortBridge")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("emitters", &self.emitters)
            .field("subscriptions", &self.subscriptions.len())
            .field("stats", &self.recorder.snapshot())
            .finish()
    }
}

impl PortBridge {
    pub fn new(ports: Rc<dyn AppPorts>) -> Self {
        Self {
            ports,
            handlers: BTreeMap::new(),
            emitters: BTreeSet::new(),
            recorder: DeliveryRecorder::default(),
            subscriptions: Vec::new(),
        }
    }

    /// Handle values the application emits on `name`.
    pub fn handle(&mut self, name: impl Into<String>, handler: impl Fn(Value) + 'static) -> &mut Self {
        self.handlers.insert(name.into(), Rc::new(handler));
        self
    }

    /// Declare that the host sends on `name`.
    pub fn declare_emitter(&mut self, name: impl Into<String>) -> &mut Self {
        self.emitters.insert(name.into());
        self
    }

    /// Subscribe every handler to its application port.
    ///
    /// Calling `attach` again first drops the previous subscriptions.
    pub fn attach(&mut self) -> WiringReport {
        self.detach();

        let declared = self.ports.channels();
        let mut report = WiringReport {
            diagnostics: channel::verify(&declared),
            ..WiringReport::default()
        };
        for diagnostic in &report.diagnostics {
            warn!(%diagnostic, "channel registry mismatch");
        }

        let app_emits: BTreeSet<&str> = declared
            .iter()
            .filter(|decl| decl.direction == Direction::FromApp)
            .map(|decl| decl.name.as_str())
            .collect();
        let app_listens: BTreeSet<&str> = declared
            .iter()
            .filter(|decl| decl.direction == Direction::ToApp)
            .map(|decl| decl.name.as_str())
            .collect();

        for &name in &app_emits {
            let Some(handler) = self.handlers.get(name) else {
                warn!(port = name, "port handler missing");
                report.missing_handlers.push(name.to_owned());
                continue;
            };
            let handler = Rc::clone(handler);
            let recorder = self.recorder.clone();
            let port = name.to_owned();
            let wrapped: PortHandler = Rc::new(move |value: Value| {
                let _span = debug_span!("port_dispatch", port = %port).entered();
                recorder.record_received();
                handler(value);
            });
            match self.ports.subscribe(name, wrapped) {
                Some(subscription) => {
                    debug!(port = name, "port attached");
                    self.subscriptions.push(subscription);
                    report.subscribed.push(name.to_owned());
                }
                None => {
                    warn!(port = name, "application refused subscription");
                    report.refused.push(name.to_owned());
                }
            }
        }

        for name in self.handlers.keys() {
            if !app_emits.contains(name.as_str()) {
                let err = Error::ChannelNotFound { name: name.clone() };
                warn!(error = %err, "port not found");
                report.not_found.push(name.clone());
            }
        }

        for name in &self.emitters {
            if !app_listens.contains(name.as_str()) {
                warn!(port = %name, "application does not listen on port; messages will be dropped");
                report.unreachable_emitters.push(name.clone());
            }
        }

        debug!(
            subscribed = report.subscribed.len(),
            clean = report.is_clean(),
            "bridge attached"
        );
        report
    }

    /// Drop every subscription made by [`attach`](Self::attach).
    pub fn detach(&mut self) -> usize {
        let count = self.subscriptions.len();
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
        count
    }

    /// Emitter for the application port `name`.
    pub fn emitter(&self, name: impl Into<String>) -> Emitter {
        let name: String = name.into();
        Emitter {
            name: Rc::from(name),
            ports: Rc::clone(&self.ports),
            recorder: self.recorder.clone(),
        }
    }

    #[must_use]
    pub fn recorder(&self) -> DeliveryRecorder {
        self.recorder.clone()
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        self.recorder.snapshot()
    }
}

impl Drop for PortBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortTable;
    use serde_json::json;
    use std::cell::RefCell;

    fn table() -> PortTable {
        let table = PortTable::new();
        table.declare_outgoing("signIn").declare_outgoing("setCache");
        table
    }

    #[test]
    fn attach_reports_both_kinds_of_mismatch() {
        let app = table();
        let mut bridge = PortBridge::new(Rc::new(app.clone()));
        bridge.handle("signIn", |_| {}).handle("signOut", |_| {});

        let report = bridge.attach();
        assert_eq!(report.subscribed, vec!["signIn"]);
        assert_eq!(report.missing_handlers, vec!["setCache"]);
        assert_eq!(report.not_found, vec!["signOut"]);
        assert!(!report.is_clean());
        assert_eq!(app.subscriber_count("signIn"), 1);
    }

    /// Declares its ports but accepts no subscriptions.
    struct Sealed(PortTable);

    impl AppPorts for Sealed {
        fn channels(&self) -> Vec<porthole_core::ChannelDecl> {
            self.0.channels()
        }

        fn subscribe(&self, _name: &str, _handler: PortHandler) -> Option<Disposer> {
            None
        }

        fn send(&self, name: &str, value: Value) -> bool {
            self.0.send(name, value)
        }
    }

    #[test]
    fn refused_subscription_is_not_reported_as_missing_port() {
        let mut bridge = PortBridge::new(Rc::new(Sealed(table())));
        bridge
            .handle("signIn", |_| {})
            .handle("setCache", |_| {})
            .handle("signOut", |_| {});

        let report = bridge.attach();
        assert!(report.subscribed.is_empty());
        assert_eq!(report.refused, vec!["setCache", "signIn"]);
        assert_eq!(report.not_found, vec!["signOut"]);
        assert!(!report.is_clean());
    }

    #[test]
    fn handlers_receive_in_order_and_are_counted() {
        let app = table();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut bridge = PortBridge::new(Rc::new(app.clone()));
        bridge.handle("setCache", move |v| sink.borrow_mut().push(v));
        bridge.attach();

        app.publish("setCache", json!(1)).unwrap();
        app.publish("setCache", json!(2)).unwrap();

        assert_eq!(*seen.borrow(), vec![json!(1), json!(2)]);
        assert_eq!(bridge.stats().received, 2);
    }

    #[test]
    fn emit_to_absent_port_is_dropped() {
        let app = PortTable::new();
        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        app.declare_incoming("onAuthStateChanged", move |v| *sink.borrow_mut() = Some(v));

        let mut bridge = PortBridge::new(Rc::new(app));
        bridge
            .declare_emitter("onAuthStateChanged")
            .declare_emitter("gotBoundingClientRects");
        let report = bridge.attach();
        assert_eq!(report.unreachable_emitters, vec!["gotBoundingClientRects"]);

        assert!(bridge.emitter("onAuthStateChanged").emit(json!(null)));
        assert!(!bridge.emitter("gotBoundingClientRects").emit(json!({})));
        assert_eq!(*got.borrow(), Some(json!(null)));
        assert_eq!(
            bridge.stats(),
            DeliveryStats {
                delivered: 1,
                dropped: 1,
                ..DeliveryStats::default()
            }
        );
    }

    #[test]
    fn reattach_and_drop_release_subscriptions() {
        let app = table();
        let mut bridge = PortBridge::new(Rc::new(app.clone()));
        bridge.handle("signIn", |_| {});
        bridge.attach();
        bridge.attach();
        assert_eq!(app.subscriber_count("signIn"), 1);
        drop(bridge);
        assert_eq!(app.subscriber_count("signIn"), 0);
    }
}
