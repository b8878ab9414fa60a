use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};

/// Pluggable string key-value storage used as the credential persistence
/// backend. Implementations may be backed by anything from browser local
/// storage to a database; each call can fail and can suspend.
pub trait StringStorage {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, String>>;
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), String>>;
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), String>>;
}

/// Reference in-memory backend. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StringStorage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        let guard = self.entries.lock().unwrap();
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut guard = self.entries.lock().unwrap();
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        let mut guard = self.entries.lock().unwrap();
        guard.remove(key);
        Ok(())
    }
}
