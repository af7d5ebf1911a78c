use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::game_state::GameState;
use crate::queue::{ControlCommandQueue, PlayerActionQueue};
use crate::store::{DocumentKind, DocumentStore, Revision, StoreError, Stored, encode, load_typed};

/// How many times a revision-checked update re-reads and retries after a
/// concurrent write before giving up.
pub const DEFAULT_WRITE_ATTEMPTS: usize = 5;

/// Typed access to the three exchange documents.
///
/// The `load_*` functions never fail: an absent or unreadable document comes
/// back as "no data" (and unreadable ones are logged). The `save_*` functions
/// replace the whole document. [`StateManager::update`] is the
/// revision-checked read-modify-write used by the producers.
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn DocumentStore>,
    write_attempts: usize,
}

impl StateManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_attempts: DEFAULT_WRITE_ATTEMPTS,
        }
    }

    pub fn with_write_attempts(mut self, attempts: usize) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Write the default of every document that does not exist yet. Safe to
    /// call on every start: present documents, including malformed ones, are
    /// left untouched. Returns the documents that were created.
    pub fn init_files(&self) -> Result<Vec<DocumentKind>, StoreError> {
        let mut created = Vec::new();
        for doc in DocumentKind::ALL {
            let default = match doc {
                DocumentKind::GameState => encode(doc, &GameState::default())?,
                DocumentKind::PlayerActions => encode(doc, &PlayerActionQueue::new())?,
                DocumentKind::ControlCommands => encode(doc, &ControlCommandQueue::new())?,
            };
            if self.store.initialize_if_absent(doc, &default)? {
                tracing::info!(file = %doc, "Initialized document with defaults");
                created.push(doc);
            }
        }
        Ok(created)
    }

    /// The stored game state, or `None` if it is absent or malformed.
    pub fn load_game_state(&self) -> Option<GameState> {
        self.load_or_log(DocumentKind::GameState)
    }

    /// The stored game state, or a fresh game if there is none.
    pub fn game_state_or_default(&self) -> GameState {
        self.load_game_state().unwrap_or_default()
    }

    pub fn save_game_state(&self, state: &GameState) -> Result<(), StoreError> {
        self.save(DocumentKind::GameState, state)
    }

    /// Pending player actions; empty if absent or malformed.
    pub fn load_player_actions(&self) -> PlayerActionQueue {
        self.load_or_log(DocumentKind::PlayerActions)
            .unwrap_or_default()
    }

    pub fn save_player_actions(&self, actions: &PlayerActionQueue) -> Result<(), StoreError> {
        self.save(DocumentKind::PlayerActions, actions)
    }

    /// Pending control commands; empty if absent or malformed.
    pub fn load_control_commands(&self) -> ControlCommandQueue {
        self.load_or_log(DocumentKind::ControlCommands)
            .unwrap_or_default()
    }

    pub fn save_control_commands(&self, commands: &ControlCommandQueue) -> Result<(), StoreError> {
        self.save(DocumentKind::ControlCommands, commands)
    }

    /// Read a document together with its revision, surfacing every error.
    pub fn load_versioned<T: DeserializeOwned>(
        &self,
        doc: DocumentKind,
    ) -> Result<Option<Stored<T>>, StoreError> {
        load_typed(self.store.as_ref(), doc)
    }

    /// Revision-checked read-modify-write.
    ///
    /// Reads `doc` (absent reads as `T::default()`), applies `f`, and writes
    /// back only if nobody else wrote in between. On a conflict the document
    /// is re-read and `f` runs again, up to the configured attempt count.
    /// A malformed document is an error, never silently replaced.
    pub fn update<T, R>(
        &self,
        doc: DocumentKind,
        mut f: impl FnMut(&mut T) -> R,
    ) -> Result<R, StoreError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut value, revision) = match self.load_versioned::<T>(doc)? {
                Some(stored) => (stored.value, stored.revision),
                None => (T::default(), Revision::Absent),
            };
            let out = f(&mut value);
            let encoded = encode(doc, &value)?;
            match self.store.put_if(doc, &encoded, &revision) {
                Ok(_) => return Ok(out),
                Err(e) if e.is_conflict() && attempt < self.write_attempts => {
                    tracing::debug!(file = %doc, attempt, "Concurrent write detected, retrying");
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn save<T: Serialize>(&self, doc: DocumentKind, value: &T) -> Result<(), StoreError> {
        let encoded = encode(doc, value)?;
        self.store.put(doc, &encoded)?;
        Ok(())
    }

    fn load_or_log<T: DeserializeOwned>(&self, doc: DocumentKind) -> Option<T> {
        match load_typed(self.store.as_ref(), doc) {
            Ok(stored) => stored.map(|s| s.value),
            Err(e) => {
                tracing::warn!(file = %doc, error = %e, "Treating unreadable document as empty");
                None
            },
        }
    }
}
