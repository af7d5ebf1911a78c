use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{DocumentKind, DocumentStore, Revision, StoreError, Stored};

/// One pretty-printed JSON file per document under a data directory.
///
/// Writes land in a temporary sibling file that is renamed over the target,
/// so a reader never sees a partially written document. The revision of a
/// document is the SHA-256 of its bytes. Writers in the same process are
/// serialized; writers in other processes are not.
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, doc: DocumentKind) -> PathBuf {
        self.dir.join(doc.file_name())
    }

    fn read_bytes(&self, doc: DocumentKind) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path(doc);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn write(&self, doc: DocumentKind, value: &Value) -> Result<Revision, StoreError> {
        let mut bytes =
            serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode { doc, source })?;
        bytes.push(b'\n');

        let target = self.path(doc);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", doc.file_name(), uuid::Uuid::new_v4()));
        let io_err = |source| StoreError::Io {
            path: target.clone(),
            source,
        };

        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        tracing::debug!(file = %doc, bytes = bytes.len(), "Wrote document");
        Ok(revision_of(&bytes))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn revision_of(bytes: &[u8]) -> Revision {
    Revision::Tag(hex::encode(Sha256::digest(bytes)))
}

impl DocumentStore for FileStore {
    fn get(&self, doc: DocumentKind) -> Result<Option<Stored>, StoreError> {
        let Some(bytes) = self.read_bytes(doc)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Corrupt { doc, source })?;
        Ok(Some(Stored {
            value,
            revision: revision_of(&bytes),
        }))
    }

    fn revision(&self, doc: DocumentKind) -> Result<Revision, StoreError> {
        Ok(match self.read_bytes(doc)? {
            Some(bytes) => revision_of(&bytes),
            None => Revision::Absent,
        })
    }

    fn put(&self, doc: DocumentKind, value: &Value) -> Result<Revision, StoreError> {
        let _guard = self.lock();
        self.write(doc, value)
    }

    fn put_if(
        &self,
        doc: DocumentKind,
        value: &Value,
        expected: &Revision,
    ) -> Result<Revision, StoreError> {
        let _guard = self.lock();
        let found = self.revision(doc)?;
        if &found != expected {
            return Err(StoreError::Conflict {
                doc,
                expected: expected.clone(),
                found,
            });
        }
        self.write(doc, value)
    }

    fn initialize_if_absent(
        &self,
        doc: DocumentKind,
        default: &Value,
    ) -> Result<bool, StoreError> {
        let _guard = self.lock();
        if self.path(doc).exists() {
            return Ok(false);
        }
        self.write(doc, default)?;
        Ok(true)
    }
}
