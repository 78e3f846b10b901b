//! In-process document store with the same optimistic semantics as the Redis backend.
//!
//! Every document carries a version bumped on each write. A transaction remembers the version
//! of every key it read and its commit fails if any of them moved. Absent keys read as version
//! zero, so two transactions racing to create the same key conflict as well.
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use parking_lot::Mutex;

use crate::database::{DocumentStore, StoreError, StoreTransaction};

#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, Document>>>,
    faults: Arc<Faults>,
}

struct Document {
    version: u64,
    value: String,
}

#[derive(Default)]
struct Faults {
    failed_commits: AtomicU32,
    conflicts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` commits fail with [`StoreError::Unavailable`] without writing.
    pub fn fail_next_commits(&self, n: u32) {
        self.faults.failed_commits.store(n, Ordering::SeqCst);
    }

    /// The next `n` commits report a conflict without writing.
    pub fn force_conflicts(&self, n: u32) {
        self.faults.conflicts.store(n, Ordering::SeqCst);
    }

    fn version(documents: &HashMap<String, Document>, key: &str) -> u64 {
        documents.get(key).map_or(0, |document| document.version)
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl DocumentStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .documents
            .lock()
            .get(key)
            .map(|document| document.value.clone()))
    }

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        Ok(MemoryTransaction {
            store: self.clone(),
            reads: HashMap::new(),
            writes: Vec::new(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct MemoryTransaction {
    store: MemoryStore,
    reads: HashMap<String, u64>,
    writes: Vec<(String, String)>,
}

impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let documents = self.store.documents.lock();
        let version = MemoryStore::version(&documents, key);
        let value = documents.get(key).map(|document| document.value.clone());

        self.reads.entry(key.to_string()).or_insert(version);

        Ok(value)
    }

    fn set(&mut self, key: &str, value: String) {
        self.writes.push((key.to_string(), value));
    }

    async fn commit(self) -> Result<bool, StoreError> {
        if take(&self.store.faults.failed_commits) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        if take(&self.store.faults.conflicts) {
            return Ok(false);
        }

        let mut documents = self.store.documents.lock();

        let stale = self
            .reads
            .iter()
            .any(|(key, version)| MemoryStore::version(&documents, key) != *version);
        if stale {
            return Ok(false);
        }

        for (key, value) in self.writes {
            let document = documents.entry(key).or_insert(Document {
                version: 0,
                value: String::new(),
            });
            document.version += 1;
            document.value = value;
        }

        Ok(true)
    }
}
