#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use porthole_core::{SessionState, User};
use porthole_gateway::scope;

#[derive(Debug, Arbitrary)]
struct Input {
    uid: String,
    path: String,
    as_document: bool,
}

fuzz_target!(|input: Input| {
    let session = SessionState::SignedIn(User::new(input.uid.clone()));
    if input.as_document {
        if let Ok(doc) = scope::document(&session, &input.path) {
            let prefix = format!("users/{}/", input.uid);
            assert!(doc.path().starts_with(&prefix));
            assert_eq!(doc.path().split('/').count() % 2, 0);
            assert!(!doc.id().is_empty());
        }
    } else if let Ok(collection) = scope::collection(&session, &input.path) {
        let segments: Vec<&str> = collection.path().split('/').collect();
        assert_eq!(segments.len() % 2, 1);
        assert!(segments.iter().all(|segment| !segment.is_empty()));
    }
});
