//! Storage for the three exchange documents.
//!
//! Every write replaces a whole document. Each stored document carries a
//! [`Revision`] so writers that care about concurrent updates can use
//! [`DocumentStore::put_if`] instead of a blind [`DocumentStore::put`].

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The three logical documents exchanged between dashboard and game process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    GameState,
    PlayerActions,
    ControlCommands,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 3] = [
        DocumentKind::GameState,
        DocumentKind::PlayerActions,
        DocumentKind::ControlCommands,
    ];

    /// File name used on disk and by the sync transport.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::GameState => "game_state.json",
            Self::PlayerActions => "player_actions.json",
            Self::ControlCommands => "control_commands.json",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Opaque token identifying the stored content of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Revision {
    /// Nothing is stored.
    Absent,
    Tag(String),
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

/// A document value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T = Value> {
    pub value: T,
    pub revision: Revision,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{doc} is malformed: {source}")]
    Corrupt {
        doc: DocumentKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {doc}: {source}")]
    Encode {
        doc: DocumentKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{doc} changed concurrently (expected revision {expected}, found {found})")]
    Conflict {
        doc: DocumentKind,
        expected: Revision,
        found: Revision,
    },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Injectable storage over the three exchange documents.
pub trait DocumentStore: Send + Sync {
    /// Read a document. `Ok(None)` means it has never been written.
    fn get(&self, doc: DocumentKind) -> Result<Option<Stored>, StoreError>;

    /// Current revision without decoding the document.
    fn revision(&self, doc: DocumentKind) -> Result<Revision, StoreError>;

    /// Replace the whole document unconditionally.
    fn put(&self, doc: DocumentKind, value: &Value) -> Result<Revision, StoreError>;

    /// Replace the whole document only if it is still at `expected`.
    fn put_if(
        &self,
        doc: DocumentKind,
        value: &Value,
        expected: &Revision,
    ) -> Result<Revision, StoreError>;

    /// Write `default` if nothing is stored. Returns true if it wrote.
    /// A present but malformed document is left alone.
    fn initialize_if_absent(&self, doc: DocumentKind, default: &Value)
    -> Result<bool, StoreError>;
}

/// Read a document and decode it into `T`. A document that is valid JSON but
/// does not match `T` is reported as corrupt.
pub fn load_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    doc: DocumentKind,
) -> Result<Option<Stored<T>>, StoreError> {
    let Some(stored) = store.get(doc)? else {
        return Ok(None);
    };
    let value =
        serde_json::from_value(stored.value).map_err(|source| StoreError::Corrupt { doc, source })?;
    Ok(Some(Stored {
        value,
        revision: stored.revision,
    }))
}

pub fn encode<T: Serialize>(doc: DocumentKind, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Encode { doc, source })
}
