#![forbid(unsafe_code)]

//! Session-scoped gateway over an identity provider and a document store.
//!
//! The gateway tracks the current [`SessionState`], scopes every collection and
//! document path under `users/{uid}/`, and owns a [`DisposerRegistry`] keyed by
//! query id.
//!
//! # Invariants
//!
//! 1. Every session transition flushes the anonymous disposers exactly once,
//!    before any session listener observes the new state.
//! 2. Transitions are serialized. A transition reported while another is being
//!    processed (e.g. from inside a disposer or listener) is queued and handled
//!    after the current one completes.
//! 3. At most one live listener per query id. Subscribing an id that is live
//!    tears the old listener down before the new one opens.
//! 4. A query's teardown runs at most once, whichever of explicit
//!    unsubscription or a session transition comes first.
//! 5. Snapshots arriving after a query was torn down are discarded.
//! 6. A query's disposer is registered before its listener opens, so a
//!    cancellation from inside the first snapshot closes the listener.
//! 7. Live queries share one anonymous session guard, so the anonymous list
//!    does not grow with repeated subscriptions.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | No session | operation before sign-in | [`Error::NoActiveSession`], nothing sent to the backend |
//! | Blank name | empty collection, path or query id | [`Error::InvalidIdentifier`] |
//! | Listener error | permission rules, network | logged, passed to the snapshot callback |
//! | Write error | permission rules, missing doc | passed to the completion |

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};

use porthole_core::{
    BackendError, DocData, Disposer, DisposerRegistry, Error, IdentifierKind, Result,
    SessionState, WhereClause,
};

use crate::backend::{Completion, DocumentStore, IdentityProvider, Query, SnapshotCallback};
use crate::defaults::{FieldDefaults, NoDefaults};
use crate::scope::{self, CollectionRef, DocumentRef};

/// Session listener.
pub type SessionCallback = Rc<dyn Fn(&SessionState)>;

struct SessionTrack {
    current: SessionState,
    pending: VecDeque<SessionState>,
    transitioning: bool,
    listeners: Vec<(u64, SessionCallback)>,
    next_listener: u64,
    transitions: u64,
}

struct Inner {
    identity: Rc<dyn IdentityProvider>,
    store: Rc<dyn DocumentStore>,
    defaults: Box<dyn FieldDefaults>,
    registry: DisposerRegistry<String>,
    session: RefCell<SessionTrack>,
    auth_subscription: RefCell<Option<Disposer>>,
    queries: RefCell<QueryTrack>,
}

/// Live query ids with the generation that opened them.
#[derive(Default)]
struct QueryTrack {
    live: HashMap<String, u64>,
    next_generation: u64,
    guarded: bool,
}

/// Resets the transition flag even if a disposer or listener panics.
struct Draining<'a>(&'a RefCell<SessionTrack>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        if let Ok(mut track) = self.0.try_borrow_mut() {
            track.transitioning = false;
        }
    }
}

impl Inner {
    fn report(&self, next: SessionState) {
        {
            let mut track = self.session.borrow_mut();
            track.pending.push_back(next);
            if track.transitioning {
                debug!(queued = track.pending.len(), "session transition queued");
                return;
            }
            track.transitioning = true;
        }
        let _draining = Draining(&self.session);
        loop {
            let (next, listeners) = {
                let mut track = self.session.borrow_mut();
                let Some(next) = track.pending.pop_front() else {
                    break;
                };
                let previous = std::mem::replace(&mut track.current, next.clone());
                track.transitions += 1;
                info!(
                    from = previous.uid().unwrap_or("-"),
                    to = next.uid().unwrap_or("-"),
                    signed_in = next.user().is_some(),
                    "session transition"
                );
                let listeners: Vec<SessionCallback> =
                    track.listeners.iter().map(|(_, l)| Rc::clone(l)).collect();
                (next, listeners)
            };
            let flushed = self.registry.dispose_all_anonymous();
            debug!(flushed, "session-scoped disposers released");
            for listener in listeners {
                listener(&next);
            }
        }
    }

    fn forget_query(&self, id: &str, generation: u64) {
        let mut queries = self.queries.borrow_mut();
        if queries.live.get(id) == Some(&generation) {
            queries.live.remove(id);
        }
    }

    /// Close every live query. Runs as the session guard.
    fn close_session_queries(&self) {
        let ids: Vec<String> = {
            let mut queries = self.queries.borrow_mut();
            queries.guarded = false;
            queries.live.drain().map(|(id, _)| id).collect()
        };
        for id in ids {
            self.registry.dispose_keyed(&id);
        }
    }
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    identity: Rc<dyn IdentityProvider>,
    store: Rc<dyn DocumentStore>,
    defaults: Box<dyn FieldDefaults>,
    registry: DisposerRegistry<String>,
}

impl GatewayBuilder {
    /// Field-defaults policy for created documents. Defaults to [`NoDefaults`].
    #[must_use]
    pub fn defaults(mut self, defaults: impl FieldDefaults + 'static) -> Self {
        self.defaults = Box::new(defaults);
        self
    }

    /// Share an existing registry instead of creating one.
    #[must_use]
    pub fn registry(mut self, registry: DisposerRegistry<String>) -> Self {
        self.registry = registry;
        self
    }

    /// Build the gateway and subscribe to the identity provider.
    #[must_use]
    pub fn build(self) -> Gateway {
        let inner = Rc::new(Inner {
            identity: self.identity,
            store: self.store,
            defaults: self.defaults,
            registry: self.registry,
            session: RefCell::new(SessionTrack {
                current: SessionState::Unknown,
                pending: VecDeque::new(),
                transitioning: false,
                listeners: Vec::new(),
                next_listener: 0,
                transitions: 0,
            }),
            auth_subscription: RefCell::new(None),
            queries: RefCell::new(QueryTrack::default()),
        });
        let weak: Weak<Inner> = Rc::downgrade(&inner);
        let subscription = inner
            .identity
            .on_auth_state_changed(Rc::new(move |user| {
                if let Some(inner) = weak.upgrade() {
                    inner.report(SessionState::from_user(user));
                }
            }));
        *inner.auth_subscription.borrow_mut() = Some(subscription);
        Gateway { inner }
    }
}

/// Session-scoped resource gateway. Clones share state.
#[derive(Clone)]
pub struct Gateway {
    inner: Rc<Inner>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("session", &self.current_session())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl Gateway {
    /// Start building a gateway over `identity` and `store`.
    pub fn builder(
        identity: impl IdentityProvider + 'static,
        store: impl DocumentStore + 'static,
    ) -> GatewayBuilder {
        GatewayBuilder {
            identity: Rc::new(identity),
            store: Rc::new(store),
            defaults: Box::new(NoDefaults),
            registry: DisposerRegistry::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Current session snapshot.
    #[must_use]
    pub fn current_session(&self) -> SessionState {
        self.inner.session.borrow().current.clone()
    }

    /// Number of session transitions processed so far.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.inner.session.borrow().transitions
    }

    /// Register `listener` for session transitions.
    ///
    /// If the session is already resolved the listener is called once with
    /// the current state before this returns.
    pub fn on_session_changed(&self, listener: impl Fn(&SessionState) + 'static) -> Disposer {
        let listener: SessionCallback = Rc::new(listener);
        let (id, current) = {
            let mut track = self.inner.session.borrow_mut();
            let id = track.next_listener;
            track.next_listener += 1;
            track.listeners.push((id, Rc::clone(&listener)));
            (id, track.current.clone())
        };
        if current.is_resolved() {
            listener(&current);
        }
        let weak = Rc::downgrade(&self.inner);
        Disposer::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .session
                    .borrow_mut()
                    .listeners
                    .retain(|(other, _)| *other != id);
            }
        })
    }

    /// Start the interactive sign-in flow.
    pub fn sign_in(&self, done: Completion) {
        debug!("sign-in requested");
        self.inner.identity.sign_in(done);
    }

    /// End the current session.
    pub fn sign_out(&self, done: Completion) {
        debug!("sign-out requested");
        self.inner.identity.sign_out(done);
    }

    // -----------------------------------------------------------------------
    // Scoping
    // -----------------------------------------------------------------------

    /// Resolve `name` to `users/{uid}/{name}`.
    ///
    /// # Errors
    ///
    /// [`Error::NoActiveSession`] or [`Error::InvalidIdentifier`].
    pub fn scoped_collection(&self, name: &str) -> Result<CollectionRef> {
        scope::collection(&self.inner.session.borrow().current, name)
    }

    /// Resolve `path` to `users/{uid}/{path}`.
    ///
    /// # Errors
    ///
    /// [`Error::NoActiveSession`] or [`Error::InvalidIdentifier`].
    pub fn scoped_document(&self, path: &str) -> Result<DocumentRef> {
        scope::document(&self.inner.session.borrow().current, path)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Open a live query under `id`, replacing any live query with that id.
    ///
    /// The listener lives until [`unsubscribe_query`](Self::unsubscribe_query)
    /// with the same id, a resubscription, or the next session transition.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidIdentifier`] for a blank id, plus the scoping errors of
    /// [`scoped_collection`](Self::scoped_collection).
    pub fn subscribe_query(
        &self,
        id: &str,
        collection: &str,
        clauses: impl IntoIterator<Item = WhereClause>,
        on_snapshot: impl Fn(Result<Vec<DocData>>) + 'static,
    ) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::invalid(IdentifierKind::QueryId, id));
        }
        let collection = self.scoped_collection(collection)?;
        let query = clauses.into_iter().fold(Query::new(collection), Query::refine);

        let registry = &self.inner.registry;
        if registry.dispose_keyed(id) {
            debug!(id, "replacing live query");
        }

        let generation = {
            let mut queries = self.inner.queries.borrow_mut();
            let generation = queries.next_generation;
            queries.next_generation += 1;
            queries.live.insert(id.to_owned(), generation);
            generation
        };

        let live = Rc::new(Cell::new(true));
        let gate = Rc::clone(&live);
        let query_id = id.to_owned();
        let callback: SnapshotCallback = Rc::new(move |result: std::result::Result<_, BackendError>| {
            if !gate.get() {
                debug!(id = %query_id, "dropping snapshot for closed query");
                return;
            }
            if let Err(err) = &result {
                warn!(id = %query_id, error = %err, "query listener failed");
            }
            on_snapshot(result.map_err(Error::from));
        });

        let slot: Rc<RefCell<Option<Disposer>>> = Rc::new(RefCell::new(None));
        let closing = Rc::clone(&live);
        let teardown_slot = Rc::clone(&slot);
        let weak = Rc::downgrade(&self.inner);
        let key = id.to_owned();
        registry.set_keyed(
            id.to_owned(),
            Disposer::new(move || {
                closing.set(false);
                let teardown = teardown_slot.borrow_mut().take();
                if let Some(teardown) = teardown {
                    teardown.dispose();
                }
                if let Some(inner) = weak.upgrade() {
                    inner.forget_query(&key, generation);
                }
            }),
        );
        self.guard_session_queries();

        debug!(
            id,
            collection = %query.collection(),
            clauses = query.clauses().len(),
            "opening query listener"
        );
        let teardown = self.inner.store.listen(query, callback);
        if live.get() {
            *slot.borrow_mut() = Some(teardown);
        } else {
            debug!(id, "query closed during its first snapshot");
            teardown.dispose();
        }
        Ok(())
    }

    /// Register the shared session guard unless one is already pending.
    fn guard_session_queries(&self) {
        {
            let mut queries = self.inner.queries.borrow_mut();
            if queries.guarded {
                return;
            }
            queries.guarded = true;
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.registry.add_anonymous(Disposer::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.close_session_queries();
            }
        }));
    }

    /// Close the live query `id`. Returns whether one was open.
    pub fn unsubscribe_query(&self, id: &str) -> bool {
        let closed = self.inner.registry.dispose_keyed(id.trim());
        if !closed {
            debug!(id, "no live query to close");
        }
        closed
    }

    /// Number of live queries.
    #[must_use]
    pub fn live_query_count(&self) -> usize {
        self.inner.registry.keyed_len()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Merge `data` into the scoped document `path`.
    ///
    /// # Errors
    ///
    /// Scoping errors; backend failures go to `done`.
    pub fn update_document(&self, path: &str, data: DocData, done: Completion) -> Result<()> {
        let doc = self.scoped_document(path)?;
        debug!(doc = %doc, "updating document");
        self.inner.store.update(&doc, data, done);
        Ok(())
    }

    /// Delete the scoped document `path`.
    ///
    /// # Errors
    ///
    /// Scoping errors; backend failures go to `done`.
    pub fn delete_document(&self, path: &str, done: Completion) -> Result<()> {
        let doc = self.scoped_document(path)?;
        debug!(doc = %doc, "deleting document");
        self.inner.store.delete(&doc, done);
        Ok(())
    }

    /// Create a document in the scoped `collection` with a fresh id.
    ///
    /// The stored data is `data` with `id` set to the generated id and field
    /// defaults applied. Returns the id.
    ///
    /// # Errors
    ///
    /// Scoping errors; backend failures go to `done`.
    pub fn create_document(
        &self,
        collection: &str,
        mut data: DocData,
        done: Completion,
    ) -> Result<String> {
        let collection = self.scoped_collection(collection)?;
        let id = self.inner.store.new_document_id(&collection);
        data.insert("id".to_owned(), serde_json::Value::String(id.clone()));
        self.inner.defaults.fill(collection.name(), &mut data);
        let doc = collection.doc(&id);
        debug!(doc = %doc, "creating document");
        self.inner.store.set(&doc, data, done);
        Ok(id)
    }

    /// Placeholder title for `collection` under the configured defaults policy.
    #[must_use]
    pub fn placeholder_title(&self, collection: &str) -> Option<String> {
        self.inner.defaults.placeholder_title(collection)
    }

    // -----------------------------------------------------------------------
    // Lifetime
    // -----------------------------------------------------------------------

    /// Run `disposer` on the next session transition.
    pub fn dispose_on_session_change(&self, disposer: Disposer) {
        self.inner.registry.add_anonymous(disposer);
    }

    /// The registry shared with the host.
    #[must_use]
    pub fn registry(&self) -> &DisposerRegistry<String> {
        &self.inner.registry
    }

    /// Stop observing identity and release everything registered.
    pub fn shutdown(&self) -> usize {
        let subscription = self.inner.auth_subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.dispose();
        }
        let released = self.inner.registry.dispose_all();
        info!(released, "gateway shut down");
        released
    }
}
