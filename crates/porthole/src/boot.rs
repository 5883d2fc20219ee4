//! Start-up sequence: read flags, construct the application, start the host.

use std::rc::Rc;

use tracing::info;

use porthole_bridge::{AppPorts, Host, HostConfig, HostParts, LayoutProbe, StaticLayout};
use porthole_gateway::{DocumentStore, Gateway, IdentityProvider, MemoryIdentity, MemoryStore, PlaceholderTitles};
use porthole_store::{FileStorage, Flags, LocalStore, MemoryStorage, StorageBackend, StorageError};

/// The external services a host talks to.
pub struct Backends {
    pub identity: Rc<dyn IdentityProvider>,
    pub documents: Rc<dyn DocumentStore>,
    pub storage: Rc<dyn StorageBackend>,
    pub layout: Rc<dyn LayoutProbe>,
}

impl Backends {
    /// Everything in process. Nothing survives the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            identity: Rc::new(MemoryIdentity::new()),
            documents: Rc::new(MemoryStore::new()),
            storage: Rc::new(MemoryStorage::new()),
            layout: Rc::new(StaticLayout::default()),
        }
    }

    /// In-process backends, with file storage when `config.storage_dir` is set.
    ///
    /// # Errors
    ///
    /// The storage directory cannot be created.
    pub fn from_config(config: &HostConfig) -> Result<Self, StorageError> {
        let mut backends = Self::in_memory();
        if let Some(dir) = &config.storage_dir {
            backends.storage = Rc::new(FileStorage::open(dir)?);
        }
        Ok(backends)
    }

    /// Browser `localStorage` and live DOM geometry. Identity and documents
    /// stay in process until replaced.
    ///
    /// # Errors
    ///
    /// `localStorage` is unavailable.
    #[cfg(feature = "web")]
    pub fn browser() -> Result<Self, StorageError> {
        Ok(Self {
            storage: Rc::new(porthole_store::WebStorage::local()?),
            layout: Rc::new(porthole_bridge::DomLayout),
            ..Self::in_memory()
        })
    }
}

/// An application together with the host serving it.
#[derive(Debug)]
pub struct Running<A> {
    pub app: A,
    pub host: Host,
}

/// Load the cold-start [`Flags`], hand them to `make_app`, and attach a host
/// to the ports it returns.
pub fn boot<A, F>(config: &HostConfig, backends: Backends, make_app: F) -> Running<A>
where
    F: FnOnce(Flags) -> (A, Rc<dyn AppPorts>),
{
    let flags = Flags::load(
        &LocalStore::new(Rc::clone(&backends.storage)),
        &config.storage_keys,
        backends.layout.viewport(),
    );
    let (app, ports) = make_app(flags);

    let mut gateway = Gateway::builder(backends.identity, backends.documents);
    if config.placeholder_titles {
        gateway = gateway.defaults(PlaceholderTitles::new());
    }
    let host = Host::start(
        ports,
        HostParts {
            gateway: gateway.build(),
            storage: backends.storage,
            layout: backends.layout,
            storage_keys: config.storage_keys.clone(),
        },
    );
    info!(clean = host.report().is_clean(), "application booted");
    Running { app, host }
}
