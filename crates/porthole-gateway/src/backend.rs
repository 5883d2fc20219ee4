//! Backend seams: the identity provider and the document store.
//!
//! Both are callback-driven and single-threaded. Completions run exactly once,
//! possibly synchronously from inside the call that started the operation.
//! Teardowns are returned as [`Disposer`]s so they can be parked in a
//! [`DisposerRegistry`](porthole_core::DisposerRegistry).

use std::rc::Rc;

use porthole_core::{BackendError, DocData, Disposer, User, WhereClause};

use crate::scope::{CollectionRef, DocumentRef};

/// One-shot completion of a write or an auth action.
pub type Completion = Box<dyn FnOnce(Result<(), BackendError>)>;

/// Snapshot listener. Called once per result-set change.
pub type SnapshotCallback = Rc<dyn Fn(Result<Vec<DocData>, BackendError>)>;

/// Identity listener. `None` means signed out.
pub type AuthCallback = Rc<dyn Fn(Option<User>)>;

/// A completion that ignores the outcome.
#[must_use]
pub fn ignore_completion() -> Completion {
    Box::new(|_| {})
}

/// Filtered view of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionRef,
    clauses: Vec<WhereClause>,
}

impl Query {
    /// Unfiltered query over `collection`.
    #[must_use]
    pub fn new(collection: CollectionRef) -> Self {
        Self {
            collection,
            clauses: Vec::new(),
        }
    }

    /// Narrow the query by one more clause.
    #[must_use]
    pub fn refine(mut self, clause: WhereClause) -> Self {
        self.clauses.push(clause);
        self
    }

    #[must_use]
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    #[must_use]
    pub fn clauses(&self) -> &[WhereClause] {
        &self.clauses
    }
}

/// Source of authentication state.
pub trait IdentityProvider {
    /// Register `callback` for every identity change, including the initial
    /// resolution. Providers that already know the state may call it before
    /// returning.
    fn on_auth_state_changed(&self, callback: AuthCallback) -> Disposer;

    /// Start the interactive sign-in flow.
    fn sign_in(&self, done: Completion);

    /// End the current session.
    fn sign_out(&self, done: Completion);
}

/// Real-time document database.
pub trait DocumentStore {
    /// Open a live listener. The returned disposer closes it.
    fn listen(&self, query: Query, on_snapshot: SnapshotCallback) -> Disposer;

    /// Fresh id for a document to be created in `collection`.
    fn new_document_id(&self, collection: &CollectionRef) -> String;

    /// Create or overwrite `doc`.
    fn set(&self, doc: &DocumentRef, data: DocData, done: Completion);

    /// Merge `data` into an existing `doc`.
    fn update(&self, doc: &DocumentRef, data: DocData, done: Completion);

    /// Delete `doc`. Deleting a missing document succeeds.
    fn delete(&self, doc: &DocumentRef, done: Completion);
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Rc<T> {
    fn on_auth_state_changed(&self, callback: AuthCallback) -> Disposer {
        (**self).on_auth_state_changed(callback)
    }

    fn sign_in(&self, done: Completion) {
        (**self).sign_in(done);
    }

    fn sign_out(&self, done: Completion) {
        (**self).sign_out(done);
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for Rc<T> {
    fn listen(&self, query: Query, on_snapshot: SnapshotCallback) -> Disposer {
        (**self).listen(query, on_snapshot)
    }

    fn new_document_id(&self, collection: &CollectionRef) -> String {
        (**self).new_document_id(collection)
    }

    fn set(&self, doc: &DocumentRef, data: DocData, done: Completion) {
        (**self).set(doc, data, done);
    }

    fn update(&self, doc: &DocumentRef, data: DocData, done: Completion) {
        (**self).update(doc, data, done);
    }

    fn delete(&self, doc: &DocumentRef, done: Completion) {
        (**self).delete(doc, done);
    }
}
