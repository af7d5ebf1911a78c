use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use super::{DocumentKind, DocumentStore, Revision, StoreError, Stored};

/// In-process document store. Revisions come from a counter shared by all
/// documents, so every write yields a revision never seen before.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    docs: HashMap<DocumentKind, (Value, u64)>,
    next_revision: u64,
}

impl MemoryInner {
    fn revision(&self, doc: DocumentKind) -> Revision {
        match self.docs.get(&doc) {
            Some((_, rev)) => Revision::Tag(rev.to_string()),
            None => Revision::Absent,
        }
    }

    fn write(&mut self, doc: DocumentKind, value: &Value) -> Revision {
        self.next_revision += 1;
        let rev = self.next_revision;
        self.docs.insert(doc, (value.clone(), rev));
        Revision::Tag(rev.to_string())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, doc: DocumentKind) -> Result<Option<Stored>, StoreError> {
        let inner = self.lock();
        Ok(inner.docs.get(&doc).map(|(value, rev)| Stored {
            value: value.clone(),
            revision: Revision::Tag(rev.to_string()),
        }))
    }

    fn revision(&self, doc: DocumentKind) -> Result<Revision, StoreError> {
        Ok(self.lock().revision(doc))
    }

    fn put(&self, doc: DocumentKind, value: &Value) -> Result<Revision, StoreError> {
        Ok(self.lock().write(doc, value))
    }

    fn put_if(
        &self,
        doc: DocumentKind,
        value: &Value,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let mut inner = self.lock();
        let found = inner.revision(doc);
        if &found != expected {
            return Err(StoreError::Conflict {
                doc,
                expected: expected.clone(),
                found,
            });
        }
        Ok(inner.write(doc, value))
    }

    fn initialize_if_absent(
        &self,
        doc: DocumentKind,
        default: &Value,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.docs.contains_key(&doc) {
            return Ok(false);
        }
        inner.write(doc, default);
        Ok(true)
    }
}
