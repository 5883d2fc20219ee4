//! In-process identity and document-store backends.
//!
//! Both behave like their hosted counterparts closely enough to drive the
//! gateway end to end: the identity provider reports the initial state to late
//! subscribers, and the store delivers an initial snapshot on `listen` and a
//! fresh snapshot to every affected listener after each write. Everything is
//! synchronous.
//!
//! Clones share state, so a test can keep a handle for inspection after moving
//! one into a [`Gateway`](crate::Gateway).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::trace;

use porthole_core::{BackendError, DocData, Disposer, Operator, User, WhereClause};

use crate::backend::{AuthCallback, Completion, DocumentStore, IdentityProvider, Query, SnapshotCallback};
use crate::scope::{CollectionRef, DocumentRef};

// ---------------------------------------------------------------------------
// MemoryIdentity
// ---------------------------------------------------------------------------

#[derive(Default)]
struct IdentityState {
    resolved: bool,
    user: Option<User>,
    sign_in_as: Option<User>,
    fail_next: Option<BackendError>,
    listeners: Vec<(u64, AuthCallback)>,
    next_listener: u64,
    sign_ins: usize,
    sign_outs: usize,
}

/// Scripted identity provider.
///
/// Starts unresolved. [`resolve`](Self::resolve) plays the role of the
/// backend reporting a state; `sign_in` resolves to the user configured with
/// [`sign_in_as`](Self::sign_in_as).
#[derive(Clone, Default)]
pub struct MemoryIdentity {
    state: Rc<RefCell<IdentityState>>,
}

impl std::fmt::Debug for MemoryIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryIdentity")
            .field("resolved", &state.resolved)
            .field("user", &state.user)
            .field("listeners", &state.listeners.len())
            .finish_non_exhaustive()
    }
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `user` (or signed out) to every listener.
    pub fn resolve(&self, user: Option<User>) {
        let listeners: Vec<AuthCallback> = {
            let mut state = self.state.borrow_mut();
            state.resolved = true;
            state.user.clone_from(&user);
            state.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
        };
        trace!(uid = user.as_ref().map(|u| u.uid.as_str()), "identity resolved");
        for listener in listeners {
            listener(user.clone());
        }
    }

    /// User that the next successful `sign_in` produces.
    pub fn sign_in_as(&self, user: User) {
        self.state.borrow_mut().sign_in_as = Some(user);
    }

    /// Fail the next `sign_in` or `sign_out` with `error`.
    pub fn fail_next(&self, error: BackendError) {
        self.state.borrow_mut().fail_next = Some(error);
    }

    /// Currently reported user.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    #[must_use]
    pub fn sign_in_calls(&self) -> usize {
        self.state.borrow().sign_ins
    }

    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.state.borrow().sign_outs
    }

    fn take_failure(&self) -> Option<BackendError> {
        self.state.borrow_mut().fail_next.take()
    }
}

impl IdentityProvider for MemoryIdentity {
    fn on_auth_state_changed(&self, callback: AuthCallback) -> Disposer {
        let (id, resolved, user) = {
            let mut state = self.state.borrow_mut();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, Rc::clone(&callback)));
            (id, state.resolved, state.user.clone())
        };
        if resolved {
            callback(user);
        }
        let weak = Rc::downgrade(&self.state);
        Disposer::new(move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().listeners.retain(|(other, _)| *other != id);
            }
        })
    }

    fn sign_in(&self, done: Completion) {
        self.state.borrow_mut().sign_ins += 1;
        if let Some(err) = self.take_failure() {
            done(Err(err));
            return;
        }
        let user = self.state.borrow().sign_in_as.clone();
        match user {
            Some(user) => {
                self.resolve(Some(user));
                done(Ok(()));
            }
            None => done(Err(BackendError::Cancelled("no account selected".into()))),
        }
    }

    fn sign_out(&self, done: Completion) {
        self.state.borrow_mut().sign_outs += 1;
        if let Some(err) = self.take_failure() {
            done(Err(err));
            return;
        }
        self.resolve(None);
        done(Ok(()));
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 20;

struct Listener {
    query: Query,
    callback: SnapshotCallback,
}

struct StoreState {
    docs: BTreeMap<String, DocData>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
    opened: usize,
    teardowns: usize,
    rng: StdRng,
    fail_next_write: Option<BackendError>,
}

/// In-memory document store with live queries.
#[derive(Clone)]
pub struct MemoryStore {
    state: Rc<RefCell<StoreState>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryStore")
            .field("documents", &state.docs.len())
            .field("listeners", &state.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose generated ids are deterministic.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Rc::new(RefCell::new(StoreState {
                docs: BTreeMap::new(),
                listeners: BTreeMap::new(),
                next_listener: 0,
                opened: 0,
                teardowns: 0,
                rng,
                fail_next_write: None,
            })),
        }
    }

    /// Write a document directly, bypassing scoping. Listeners are notified.
    pub fn insert(&self, path: &str, data: DocData) {
        self.state.borrow_mut().docs.insert(path.to_owned(), data);
        self.notify(parent_of(path));
    }

    /// Stored document at the full `path`.
    #[must_use]
    pub fn document(&self, path: &str) -> Option<DocData> {
        self.state.borrow().docs.get(path).cloned()
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.state.borrow().docs.len()
    }

    /// Listeners opened over the store's lifetime.
    #[must_use]
    pub fn opened_listeners(&self) -> usize {
        self.state.borrow().opened
    }

    /// Listeners currently open.
    #[must_use]
    pub fn active_listeners(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Listener teardowns over the store's lifetime.
    #[must_use]
    pub fn teardowns(&self) -> usize {
        self.state.borrow().teardowns
    }

    /// Fail the next write with `error`.
    pub fn fail_next_write(&self, error: BackendError) {
        self.state.borrow_mut().fail_next_write = Some(error);
    }

    /// Deliver `error` to every listener on the collection at `path`.
    pub fn break_listeners(&self, path: &str, error: BackendError) {
        let callbacks: Vec<SnapshotCallback> = self
            .state
            .borrow()
            .listeners
            .values()
            .filter(|l| l.query.collection().path() == path)
            .map(|l| Rc::clone(&l.callback))
            .collect();
        for callback in callbacks {
            callback(Err(error.clone()));
        }
    }

    fn evaluate(docs: &BTreeMap<String, DocData>, query: &Query) -> Vec<DocData> {
        let collection = query.collection().path();
        docs.iter()
            .filter(|(path, _)| parent_of(path) == collection)
            .filter(|(_, data)| query.clauses().iter().all(|c| matches_clause(data, c)))
            .map(|(_, data)| data.clone())
            .collect()
    }

    fn notify(&self, collection: &str) {
        let deliveries: Vec<(SnapshotCallback, Vec<DocData>)> = {
            let state = self.state.borrow();
            state
                .listeners
                .values()
                .filter(|l| l.query.collection().path() == collection)
                .map(|l| (Rc::clone(&l.callback), Self::evaluate(&state.docs, &l.query)))
                .collect()
        };
        for (callback, docs) in deliveries {
            callback(Ok(docs));
        }
    }

    fn take_write_failure(&self) -> Option<BackendError> {
        self.state.borrow_mut().fail_next_write.take()
    }
}

impl DocumentStore for MemoryStore {
    fn listen(&self, query: Query, on_snapshot: SnapshotCallback) -> Disposer {
        let (id, initial) = {
            let mut state = self.state.borrow_mut();
            let id = state.next_listener;
            state.next_listener += 1;
            state.opened += 1;
            let initial = Self::evaluate(&state.docs, &query);
            state.listeners.insert(
                id,
                Listener {
                    query,
                    callback: Rc::clone(&on_snapshot),
                },
            );
            (id, initial)
        };
        trace!(listener = id, "listener opened");
        on_snapshot(Ok(initial));

        let weak = Rc::downgrade(&self.state);
        Disposer::new(move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.listeners.remove(&id).is_some() {
                    state.teardowns += 1;
                }
            }
        })
    }

    fn new_document_id(&self, _collection: &CollectionRef) -> String {
        let mut state = self.state.borrow_mut();
        (0..ID_LEN)
            .map(|_| char::from(ID_ALPHABET[state.rng.gen_range(0..ID_ALPHABET.len())]))
            .collect()
    }

    fn set(&self, doc: &DocumentRef, data: DocData, done: Completion) {
        if let Some(err) = self.take_write_failure() {
            done(Err(err));
            return;
        }
        self.state
            .borrow_mut()
            .docs
            .insert(doc.path().to_owned(), data);
        self.notify(doc.parent_path());
        done(Ok(()));
    }

    fn update(&self, doc: &DocumentRef, data: DocData, done: Completion) {
        if let Some(err) = self.take_write_failure() {
            done(Err(err));
            return;
        }
        let merged = {
            let mut state = self.state.borrow_mut();
            match state.docs.get_mut(doc.path()) {
                Some(existing) => {
                    existing.extend(data);
                    true
                }
                None => false,
            }
        };
        if !merged {
            done(Err(BackendError::NotFound(doc.path().to_owned())));
            return;
        }
        self.notify(doc.parent_path());
        done(Ok(()));
    }

    fn delete(&self, doc: &DocumentRef, done: Completion) {
        if let Some(err) = self.take_write_failure() {
            done(Err(err));
            return;
        }
        let removed = self.state.borrow_mut().docs.remove(doc.path()).is_some();
        if removed {
            self.notify(doc.parent_path());
        }
        done(Ok(()));
    }
}

// ---------------------------------------------------------------------------
// Query evaluation
// ---------------------------------------------------------------------------

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Dotted field lookup: `a.b` reads `{"a": {"b": ..}}`.
fn field<'a>(data: &'a DocData, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn same(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn matches_clause(data: &DocData, clause: &WhereClause) -> bool {
    // Documents without the field never match, whatever the operator.
    let Some(actual) = field(data, &clause.field) else {
        return false;
    };
    let expected = &clause.value;
    let any_of = |candidates: &Value| {
        candidates
            .as_array()
            .is_some_and(|list| list.iter().any(|c| same(actual, c)))
    };
    match clause.op {
        Operator::Eq => same(actual, expected),
        Operator::Ne => !same(actual, expected),
        Operator::Lt => compare(actual, expected) == Some(Ordering::Less),
        Operator::Le => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        Operator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        Operator::Ge => {
            matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        Operator::ArrayContains => actual
            .as_array()
            .is_some_and(|list| list.iter().any(|item| same(item, expected))),
        Operator::ArrayContainsAny => actual.as_array().is_some_and(|list| {
            expected
                .as_array()
                .is_some_and(|wanted| list.iter().any(|item| wanted.iter().any(|w| same(item, w))))
        }),
        Operator::In => any_of(expected),
        Operator::NotIn => expected.is_array() && !any_of(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ignore_completion;
    use crate::scope;
    use porthole_core::SessionState;
    use serde_json::json;
    use std::cell::Cell;

    type Snapshot = Result<Vec<DocData>, BackendError>;
    type Outcome = Result<(), BackendError>;

    fn doc(value: Value) -> DocData {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn todos() -> CollectionRef {
        scope::collection(&SessionState::SignedIn(User::new("u1")), "todos").unwrap()
    }

    #[test]
    fn operators_follow_document_database_semantics() {
        let data = doc(json!({
            "n": 3,
            "s": "b",
            "tags": ["x", "y"],
            "meta": {"rank": 2.0}
        }));
        let check = |field: &str, op, value: Value| {
            matches_clause(&data, &WhereClause::new(field, op, value))
        };

        assert!(check("n", Operator::Eq, json!(3.0)));
        assert!(check("n", Operator::Lt, json!(4)));
        assert!(!check("n", Operator::Gt, json!(3)));
        assert!(check("n", Operator::Ge, json!(3)));
        assert!(check("s", Operator::Le, json!("c")));
        assert!(check("s", Operator::Ne, json!("a")));
        assert!(check("tags", Operator::ArrayContains, json!("y")));
        assert!(check("tags", Operator::ArrayContainsAny, json!(["z", "x"])));
        assert!(check("s", Operator::In, json!(["a", "b"])));
        assert!(check("s", Operator::NotIn, json!(["a", "c"])));
        assert!(check("meta.rank", Operator::Eq, json!(2)));
        assert!(!check("missing", Operator::Ne, json!(1)));
        assert!(!check("n", Operator::Lt, json!("4")));
    }

    #[test]
    fn writes_notify_matching_listeners_only() {
        let store = MemoryStore::seeded(1);
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _listener = store.listen(
            Query::new(todos()),
            Rc::new(move |_: Snapshot| counter.set(counter.get() + 1)),
        );
        assert_eq!(hits.get(), 1);

        store.set(&todos().doc("t1"), doc(json!({"id": "t1"})), ignore_completion());
        store.insert("users/u1/projects/p1", doc(json!({"id": "p1"})));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn update_merges_and_missing_update_fails() {
        let store = MemoryStore::seeded(1);
        let target = todos().doc("t1");
        store.set(&target, doc(json!({"title": "a", "done": false})), ignore_completion());
        store.update(&target, doc(json!({"done": true})), ignore_completion());
        assert_eq!(
            store.document("users/u1/todos/t1"),
            Some(doc(json!({"title": "a", "done": true})))
        );

        let outcome = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&outcome);
        store.update(
            &todos().doc("nope"),
            DocData::new(),
            Box::new(move |r: Outcome| *sink.borrow_mut() = Some(r)),
        );
        assert!(matches!(
            *outcome.borrow(),
            Some(Err(BackendError::NotFound(_)))
        ));
    }

    #[test]
    fn injected_write_failure_reaches_completion_once() {
        let store = MemoryStore::seeded(1);
        store.fail_next_write(BackendError::PermissionDenied("rules".into()));
        let failures = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let counter = Rc::clone(&failures);
            store.delete(
                &todos().doc("t1"),
                Box::new(move |r: Outcome| {
                    if r.is_err() {
                        counter.set(counter.get() + 1);
                    }
                }),
            );
        }
        assert_eq!(failures.get(), 1);
    }

    #[test]
    fn teardown_is_counted_once() {
        let store = MemoryStore::seeded(1);
        let listener = store.listen(Query::new(todos()), Rc::new(|_: Snapshot| {}));
        assert_eq!(store.active_listeners(), 1);
        listener.dispose();
        assert_eq!((store.active_listeners(), store.teardowns()), (0, 1));
    }

    #[test]
    fn generated_ids_are_alphanumeric() {
        let store = MemoryStore::seeded(5);
        let id = store.new_document_id(&todos());
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, store.new_document_id(&todos()));
    }

    #[test]
    fn identity_reports_state_to_late_listeners() {
        let identity = MemoryIdentity::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let _early = identity.on_auth_state_changed(Rc::new(move |u: Option<User>| {
            sink.borrow_mut().push(u.map(|u| u.uid));
        }));
        assert!(seen.borrow().is_empty());

        identity.sign_in_as(User::new("u1"));
        identity.sign_in(ignore_completion());
        identity.sign_out(ignore_completion());
        assert_eq!(*seen.borrow(), vec![Some("u1".to_owned()), None]);

        let late = Rc::new(Cell::new(false));
        let flag = Rc::clone(&late);
        let _late = identity.on_auth_state_changed(Rc::new(move |u: Option<User>| flag.set(u.is_none())));
        assert!(late.get());
    }

    #[test]
    fn sign_in_without_account_is_cancelled() {
        let identity = MemoryIdentity::new();
        let outcome = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&outcome);
        identity.sign_in(Box::new(move |r: Outcome| *sink.borrow_mut() = Some(r)));
        assert!(matches!(
            *outcome.borrow(),
            Some(Err(BackendError::Cancelled(_)))
        ));
        assert_eq!(identity.sign_in_calls(), 1);
        assert_eq!(identity.user(), None);
    }
}
