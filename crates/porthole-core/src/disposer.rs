#![forbid(unsafe_code)]

//! Disposer registry: deterministic teardown for external listeners.
//!
//! A [`Disposer`] is a one-shot "stop and release" callback handed back by
//! whatever acquired a resource (a live query listener, an auth listener, a
//! timer). The [`DisposerRegistry`] owns disposers in two shapes:
//!
//! - **Anonymous list**: identity-scoped disposers with no individual name,
//!   flushed together (e.g. on every session transition).
//! - **Keyed set**: at most one live disposer per key (e.g. a query id).
//!   Registering under an occupied key tears the previous one down first.
//!
//! # Invariants
//!
//! 1. A disposer runs at most once (it is consumed by [`Disposer::dispose`]).
//! 2. No two live disposers share a key.
//! 3. [`DisposerRegistry::dispose_all_anonymous`] runs exactly the disposers
//!    present when it was called, in insertion order. Disposers added while the
//!    flush is running are kept for the next flush.
//! 4. No registry borrow is held while a disposer runs, so disposers may call
//!    back into the registry.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Dispose of absent key | Registration never happened or already disposed | No-op, returns `false` |
//! | Disposer re-registers its own key | Side effect during replacement | Displaced disposer is run |
//! | Registry dropped with live disposers | Owner went away without `dispose_all` | Disposers are dropped unrun |

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

// ---------------------------------------------------------------------------
// Disposer
// ---------------------------------------------------------------------------

/// A one-shot teardown callback.
pub struct Disposer {
    release: Box<dyn FnOnce()>,
}

impl Disposer {
    /// Wrap a teardown closure.
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Box::new(release),
        }
    }

    /// A disposer that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Run the teardown, consuming the disposer.
    pub fn dispose(self) {
        (self.release)();
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// DisposerRegistry
// ---------------------------------------------------------------------------

struct RegistryState<K> {
    anonymous: Vec<Disposer>,
    keyed: HashMap<K, Disposer>,
}

/// Shared owner of anonymous and keyed disposers.
///
/// Cloning yields another handle to the same registry. The registry is
/// single-threaded (`Rc<RefCell<..>>`); a multi-threaded host would put the
/// whole state behind one mutex instead.
pub struct DisposerRegistry<K> {
    state: Rc<RefCell<RegistryState<K>>>,
}

impl<K> Clone for DisposerRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<K: Eq + Hash> Default for DisposerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> DisposerRegistry<K> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                anonymous: Vec::new(),
                keyed: HashMap::new(),
            })),
        }
    }

    /// Append a disposer to the anonymous list.
    pub fn add_anonymous(&self, disposer: Disposer) {
        self.state.borrow_mut().anonymous.push(disposer);
    }

    /// Run every anonymous disposer registered so far, in insertion order.
    ///
    /// The batch is detached before the first disposer runs, so anything a
    /// disposer adds lands in the next batch. Returns the number of disposers
    /// run.
    pub fn dispose_all_anonymous(&self) -> usize {
        let batch = std::mem::take(&mut self.state.borrow_mut().anonymous);
        let count = batch.len();
        for disposer in batch {
            disposer.dispose();
        }
        count
    }

    /// Install `disposer` under `key`, running the previous holder first.
    pub fn set_keyed(&self, key: K, disposer: Disposer) {
        let previous = self.state.borrow_mut().keyed.remove(&key);
        if let Some(previous) = previous {
            previous.dispose();
        }
        // The previous disposer may have registered this key again.
        let displaced = self.state.borrow_mut().keyed.insert(key, disposer);
        if let Some(displaced) = displaced {
            displaced.dispose();
        }
    }

    /// Run and remove the disposer under `key`. Absent keys are a no-op.
    pub fn dispose_keyed<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.state.borrow_mut().keyed.remove(key);
        match removed {
            Some(disposer) => {
                disposer.dispose();
                true
            }
            None => false,
        }
    }

    /// Run every keyed disposer, then flush the anonymous list.
    pub fn dispose_all(&self) -> usize {
        let keyed: Vec<Disposer> = {
            let mut state = self.state.borrow_mut();
            state.keyed.drain().map(|(_, d)| d).collect()
        };
        let mut count = keyed.len();
        for disposer in keyed {
            disposer.dispose();
        }
        count += self.dispose_all_anonymous();
        count
    }

    /// Whether a disposer is registered under `key`.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.borrow().keyed.contains_key(key)
    }

    /// Number of pending anonymous disposers.
    #[must_use]
    pub fn anonymous_len(&self) -> usize {
        self.state.borrow().anonymous.len()
    }

    /// Number of live keyed disposers.
    #[must_use]
    pub fn keyed_len(&self) -> usize {
        self.state.borrow().keyed.len()
    }

    /// A handle that does not keep the registry alive.
    ///
    /// Disposers stored inside the registry must use this to refer back to it.
    #[must_use]
    pub fn downgrade(&self) -> WeakDisposerRegistry<K> {
        WeakDisposerRegistry {
            state: Rc::downgrade(&self.state),
        }
    }
}

impl<K> fmt::Debug for DisposerRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("DisposerRegistry")
                .field("anonymous", &state.anonymous.len())
                .field("keyed", &state.keyed.len())
                .finish(),
            Err(_) => f.debug_struct("DisposerRegistry").finish_non_exhaustive(),
        }
    }
}

/// Non-owning handle to a [`DisposerRegistry`].
pub struct WeakDisposerRegistry<K> {
    state: Weak<RefCell<RegistryState<K>>>,
}

impl<K> Clone for WeakDisposerRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            state: Weak::clone(&self.state),
        }
    }
}

impl<K> WeakDisposerRegistry<K> {
    /// Recover a strong handle if the registry is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<DisposerRegistry<K>> {
        self.state.upgrade().map(|state| DisposerRegistry { state })
    }
}

impl<K> fmt::Debug for WeakDisposerRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDisposerRegistry")
            .field("alive", &(self.state.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
