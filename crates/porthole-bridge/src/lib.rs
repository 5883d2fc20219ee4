#![forbid(unsafe_code)]

//! Port wiring between an application and its host.
//!
//! - [`AppPorts`] / [`PortTable`]: the application's named ports.
//! - [`PortBridge`]: joins host handlers and emitters to those ports by name.
//! - [`Host`]: the full composition, dispatching every registry channel to the
//!   gateway, the persistence adapter and the layout probe.
//! - [`HostConfig`]: TOML-loadable settings.

pub mod bridge;
pub mod config;
pub mod host;
pub mod layout;
pub mod port;

pub use bridge::{DeliveryRecorder, DeliveryStats, Emitter, PortBridge, WiringReport};
pub use config::{ConfigError, HostConfig, LogConfig};
pub use host::{Host, HostParts};
#[cfg(feature = "web")]
pub use layout::DomLayout;
pub use layout::{LayoutProbe, StaticLayout, measure};
pub use port::{AppPorts, PortHandler, PortTable};
