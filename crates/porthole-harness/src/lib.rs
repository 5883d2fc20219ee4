#![forbid(unsafe_code)]

//! Test harness for Porthole hosts.
//!
//! [`Scenario`] assembles a host over in-memory backends and a [`FakeApp`],
//! keeping handles to every backend so tests can script identity changes,
//! seed documents and inspect storage. [`LogCapture`] records tracing events
//! for assertions on warnings.

pub mod app;
pub mod capture;

use std::rc::Rc;

use porthole::{Backends, HostConfig, Running, boot};
use porthole_bridge::StaticLayout;
use porthole_core::{User, Viewport};
use porthole_gateway::{MemoryIdentity, MemoryStore};
use porthole_store::MemoryStorage;

pub use app::FakeApp;
pub use capture::{CapturedEvent, LogCapture};

/// A booted host with inspectable in-memory backends.
#[derive(Debug)]
pub struct Harness {
    pub running: Running<FakeApp>,
    pub identity: MemoryIdentity,
    pub documents: MemoryStore,
    pub storage: MemoryStorage,
    pub layout: Rc<StaticLayout>,
}

impl Harness {
    #[must_use]
    pub fn app(&self) -> &FakeApp {
        &self.running.app
    }

    /// Report `uid` as signed in.
    pub fn sign_in_as(&self, uid: &str) {
        self.identity.resolve(Some(User::new(uid)));
    }

    /// Report the session as signed out.
    pub fn sign_out(&self) {
        self.identity.resolve(None);
    }
}

/// Builder for a [`Harness`].
#[derive(Debug, Clone)]
pub struct Scenario {
    config: HostConfig,
    app: FakeApp,
    storage: MemoryStorage,
    seed: u64,
    viewport: Viewport,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            config: HostConfig::default(),
            app: FakeApp::full(),
            storage: MemoryStorage::new(),
            seed: 0,
            viewport: Viewport {
                width: 1280.0,
                height: 800.0,
            },
        }
    }
}

impl Scenario {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn app(mut self, app: FakeApp) -> Self {
        self.app = app;
        self
    }

    /// Reuse `storage`, e.g. to simulate a restart.
    #[must_use]
    pub fn storage(mut self, storage: MemoryStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Seed for generated document ids.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Boot the host.
    #[must_use]
    pub fn start(self) -> Harness {
        let identity = MemoryIdentity::new();
        let documents = MemoryStore::seeded(self.seed);
        let layout = Rc::new(StaticLayout::new(self.viewport));
        let backends = Backends {
            identity: Rc::new(identity.clone()),
            documents: Rc::new(documents.clone()),
            storage: Rc::new(self.storage.clone()),
            layout: Rc::clone(&layout) as Rc<dyn porthole_bridge::LayoutProbe>,
        };
        let app = self.app;
        let running = boot(&self.config, backends, move |flags| {
            let app = app.with_flags(flags);
            let ports = app.ports();
            (app, ports)
        });
        Harness {
            running,
            identity,
            documents,
            storage: self.storage,
            layout,
        }
    }
}
