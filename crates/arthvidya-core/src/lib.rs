pub mod game_state;
pub mod manager;
pub mod producer;
pub mod queue;
pub mod store;
pub mod time;

pub use game_state::{GamePhase, GameState, LogEntry, Team, TeamId};
pub use manager::StateManager;
pub use queue::{ControlCommand, ControlCommandQueue, PlayerAction, PlayerActionQueue};
pub use store::{DocumentKind, DocumentStore, FileStore, MemoryStore, Revision, StoreError};

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::manager::StateManager;
    use crate::queue::{CONTROL_CENTER_SOURCE, ControlCommand};
    use crate::store::MemoryStore;

    /// Scratch directory under the system temp dir, removed on drop.
    pub struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        #[allow(clippy::new_without_default)]
        pub fn new() -> Self {
            let path =
                std::env::temp_dir().join(format!("arthvidya-test-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self { path }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    /// A control command as the dashboard would write it.
    pub fn make_command(command: &str, timestamp: &str) -> ControlCommand {
        ControlCommand {
            command: command.to_string(),
            timestamp: timestamp.to_string(),
            source: CONTROL_CENTER_SOURCE.to_string(),
        }
    }

    /// A state manager over a fresh in-memory store with defaults written.
    pub fn initialized_memory_manager() -> StateManager {
        let manager = StateManager::new(Arc::new(MemoryStore::new()));
        manager.init_files().unwrap();
        manager
    }
}
