//! Cache blobs survive an adapter restart on the same backend.

use porthole_store::{FileStorage, LocalStore, MemoryStorage, StorageBackend};
use serde_json::{Value, json};

fn save_then_restart<B: StorageBackend + Clone>(backend: B) {
    {
        let store = LocalStore::new(backend.clone());
        store.write_json("appCache", &json!({"count": 3})).unwrap();
    }

    let restarted = LocalStore::new(backend.clone());
    assert_eq!(restarted.read_json("appCache"), Some(json!({"count": 3})));

    restarted.write_json("appCache", &Value::Null).unwrap();
    assert_eq!(backend.get("appCache").unwrap(), None);

    let again = LocalStore::new(backend);
    assert_eq!(again.read_json("appCache"), None);
}

#[test]
fn memory_backend_restart() {
    save_then_restart(MemoryStorage::new());
}

#[test]
fn file_backend_restart() {
    let dir = tempfile::tempdir().unwrap();
    save_then_restart(FileStorage::open(dir.path()).unwrap());

    // A second handle opened on the same directory sees the same state.
    let first = LocalStore::new(FileStorage::open(dir.path()).unwrap());
    first.write_json("cachedProjectList", &json!([{"id": "p1"}])).unwrap();
    let second = LocalStore::new(FileStorage::open(dir.path()).unwrap());
    assert_eq!(
        second.read_json("cachedProjectList"),
        Some(json!([{"id": "p1"}]))
    );
}
