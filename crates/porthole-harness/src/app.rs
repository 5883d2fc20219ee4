//! A scriptable stand-in for the hosted application.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use porthole_bridge::{AppPorts, PortTable};
use porthole_core::{FromAppChannel, Result, ToAppChannel};
use porthole_store::Flags;

/// Fake application exposing registry ports and recording what it receives.
#[derive(Debug, Clone)]
pub struct FakeApp {
    ports: PortTable,
    inbox: Rc<RefCell<Vec<(String, Value)>>>,
    flags: Option<Flags>,
}

impl FakeApp {
    /// An application declaring every registry channel.
    #[must_use]
    pub fn full() -> Self {
        Self::with_channels(&FromAppChannel::ALL, &ToAppChannel::ALL)
    }

    /// An application declaring only the given channels.
    #[must_use]
    pub fn with_channels(emits: &[FromAppChannel], listens: &[ToAppChannel]) -> Self {
        let app = Self {
            ports: PortTable::new(),
            inbox: Rc::default(),
            flags: None,
        };
        for channel in emits {
            app.ports.declare_outgoing(channel.name());
        }
        for channel in listens {
            app.listen_on(channel.name());
        }
        app
    }

    /// Declare an extra incoming port by raw name.
    pub fn listen_on(&self, name: &str) -> &Self {
        let inbox = Rc::clone(&self.inbox);
        let port = name.to_owned();
        self.ports.declare_incoming(name, move |value| {
            inbox.borrow_mut().push((port.clone(), value));
        });
        self
    }

    /// Declare an extra outgoing port by raw name.
    pub fn emit_on(&self, name: &str) -> &Self {
        self.ports.declare_outgoing(name);
        self
    }

    /// Remember the flags the host handed over at start-up.
    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = Some(flags);
        self
    }

    #[must_use]
    pub fn flags(&self) -> Option<&Flags> {
        self.flags.as_ref()
    }

    /// Ports handle to give to the host.
    #[must_use]
    pub fn ports(&self) -> Rc<dyn AppPorts> {
        Rc::new(self.ports.clone())
    }

    /// Emit on a registry channel.
    ///
    /// # Errors
    ///
    /// `ChannelNotFound` if this application does not declare the channel.
    pub fn send(&self, channel: FromAppChannel, payload: Value) -> Result<usize> {
        self.ports.publish(channel.name(), payload)
    }

    /// Emit on an arbitrary port name.
    ///
    /// # Errors
    ///
    /// `ChannelNotFound` if this application does not declare the port.
    pub fn send_raw(&self, name: &str, payload: Value) -> Result<usize> {
        self.ports.publish(name, payload)
    }

    /// Every payload received on `channel`, oldest first.
    #[must_use]
    pub fn received(&self, channel: ToAppChannel) -> Vec<Value> {
        self.inbox
            .borrow()
            .iter()
            .filter(|(port, _)| port == channel.name())
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Most recent payload on `channel`.
    #[must_use]
    pub fn last(&self, channel: ToAppChannel) -> Option<Value> {
        self.received(channel).pop()
    }

    /// Forget everything received so far.
    pub fn clear(&self) {
        self.inbox.borrow_mut().clear();
    }

    #[must_use]
    pub fn subscriber_count(&self, channel: FromAppChannel) -> usize {
        self.ports.subscriber_count(channel.name())
    }
}
