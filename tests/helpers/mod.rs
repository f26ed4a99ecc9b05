#![allow(dead_code)]

use std::sync::Arc;

use mnemo::embedding::hashed::HashedEmbeddingProvider;
use mnemo::embedding::EmbeddingProvider;
use mnemo::store::sqlite::SqliteStore;
use mnemo::store::types::{Role, Session};
use mnemo::store::StorageBackend;

/// Embedding width used across the integration suites — small keeps the vec0
/// table cheap while exercising the same code paths as 384.
pub const DIM: usize = 16;

/// Fresh in-memory store with schema and migrations applied.
pub fn test_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory(DIM).unwrap())
}

/// Deterministic embedding provider: same text, same vector, every run.
pub fn test_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashedEmbeddingProvider::new(DIM))
}

/// Unit vector with a spike at `seed`; distinct seeds are orthogonal.
pub fn spike_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

/// Create a session with a couple of user messages and return it.
pub fn seed_session(store: &Arc<SqliteStore>, id: &str, title: &str, turns: &[&str]) -> Session {
    let session = Session::new(id, title, None);
    store.create_session(&session).unwrap();
    for turn in turns {
        store.add_message(id, Role::User, turn, 4).unwrap();
    }
    store.get_session(id).unwrap().unwrap()
}
