#![forbid(unsafe_code)]

//! Porthole public facade.
//!
//! Porthole hosts an application that talks to the outside world only through
//! named ports: it wires those ports to an identity provider, a real-time
//! document store, key/value storage and element geometry, and keeps every
//! user-scoped resource tied to the session that created it.
//!
//! ```no_run
//! use std::rc::Rc;
//! use porthole::prelude::*;
//!
//! let config = HostConfig::default();
//! let running = porthole::boot(&config, Backends::in_memory(), |flags| {
//!     let ports = PortTable::new();
//!     ports.declare_outgoing("signIn");
//!     let app_ports: Rc<dyn AppPorts> = Rc::new(ports.clone());
//!     ((ports, flags), app_ports)
//! });
//! assert!(running.host.report().subscribed.contains(&"signIn".to_owned()));
//! ```

pub mod boot;
#[cfg(feature = "logging")]
pub mod logging;

pub use boot::{Backends, Running, boot};

pub use porthole_bridge as bridge;
pub use porthole_core as vocab;
pub use porthole_gateway as gateway;
pub use porthole_store as store;

pub use porthole_bridge::{
    AppPorts, DeliveryStats, Host, HostConfig, HostParts, LogConfig, PortBridge, PortTable,
    WiringReport,
};
pub use porthole_core::{Disposer, DisposerRegistry, Error, Result, SessionState, User};
pub use porthole_gateway::Gateway;
pub use porthole_store::{Flags, LocalStore, StorageKeys};

/// Common imports for hosting an application.
pub mod prelude {
    pub use crate::{
        AppPorts, Backends, Disposer, Error, Flags, Gateway, Host, HostConfig, PortTable,
        Running, SessionState, User, boot,
    };
}
