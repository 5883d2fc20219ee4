//! The application's side of the ports.
//!
//! [`AppPorts`] is what the host sees of a running application: the channels it
//! declares, a way to subscribe to the ones it emits on, and a way to deliver
//! values to the ones it listens on. Names are the only join key.
//!
//! [`PortTable`] is an in-process implementation for embedding applications
//! written in Rust and for tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{trace, warn};

use porthole_core::{ChannelDecl, Disposer, Error, Result};

/// Handler for values arriving on one port.
pub type PortHandler = Rc<dyn Fn(Value)>;

/// Ports exposed by a running application.
pub trait AppPorts {
    /// Every channel the application declares.
    fn channels(&self) -> Vec<ChannelDecl>;

    /// Subscribe to the application → host port `name`.
    ///
    /// `None` if the application has no such port.
    fn subscribe(&self, name: &str, handler: PortHandler) -> Option<Disposer>;

    /// Deliver `value` on the host → application port `name`.
    ///
    /// Returns `false` if the application has no such port.
    fn send(&self, name: &str, value: Value) -> bool;
}

#[derive(Default)]
struct TableState {
    outgoing: BTreeMap<String, Vec<(u64, PortHandler)>>,
    incoming: BTreeMap<String, PortHandler>,
    next_subscriber: u64,
}

/// In-process port table. Clones share the same ports.
#[derive(Clone, Default)]
pub struct PortTable {
    state: Rc<RefCell<TableState>>,
}

impl fmt::Debug for PortTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("PortTable")
            .field("outgoing", &state.outgoing.keys().collect::<Vec<_>>())
            .field("incoming", &state.incoming.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PortTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a port the application emits on.
    pub fn declare_outgoing(&self, name: impl Into<String>) -> &Self {
        self.state
            .borrow_mut()
            .outgoing
            .entry(name.into())
            .or_default();
        self
    }

    /// Declare a port the application listens on.
    pub fn declare_incoming(&self, name: impl Into<String>, handler: impl Fn(Value) + 'static) -> &Self {
        self.state
            .borrow_mut()
            .incoming
            .insert(name.into(), Rc::new(handler));
        self
    }

    /// Emit `value` on the outgoing port `name`, as the application would.
    ///
    /// Handlers run synchronously in subscription order. Returns how many ran.
    ///
    /// # Errors
    ///
    /// [`Error::ChannelNotFound`] if the port was never declared. No handler
    /// runs.
    pub fn publish(&self, name: &str, value: Value) -> Result<usize> {
        let handlers: Vec<PortHandler> = {
            let state = self.state.borrow();
            let Some(subscribers) = state.outgoing.get(name) else {
                warn!(port = name, "publish on undeclared port");
                return Err(Error::ChannelNotFound {
                    name: name.to_owned(),
                });
            };
            subscribers.iter().map(|(_, h)| Rc::clone(h)).collect()
        };
        trace!(port = name, subscribers = handlers.len(), "publishing");
        let count = handlers.len();
        for handler in handlers {
            handler(value.clone());
        }
        Ok(count)
    }

    /// Number of live subscriptions on `name`.
    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.state
            .borrow()
            .outgoing
            .get(name)
            .map_or(0, Vec::len)
    }
}

impl AppPorts for PortTable {
    fn channels(&self) -> Vec<ChannelDecl> {
        let state = self.state.borrow();
        state
            .outgoing
            .keys()
            .map(ChannelDecl::from_app)
            .chain(state.incoming.keys().map(ChannelDecl::to_app))
            .collect()
    }

    fn subscribe(&self, name: &str, handler: PortHandler) -> Option<Disposer> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_subscriber;
            let subscribers = state.outgoing.get_mut(name)?;
            subscribers.push((id, handler));
            state.next_subscriber += 1;
            id
        };
        let weak = Rc::downgrade(&self.state);
        let name = name.to_owned();
        Some(Disposer::new(move || {
            if let Some(state) = weak.upgrade()
                && let Some(subscribers) = state.borrow_mut().outgoing.get_mut(&name)
            {
                subscribers.retain(|(other, _)| *other != id);
            }
        }))
    }

    fn send(&self, name: &str, value: Value) -> bool {
        let handler = self.state.borrow().incoming.get(name).cloned();
        match handler {
            Some(handler) => {
                handler(value);
                true
            }
            None => false,
        }
    }
}
