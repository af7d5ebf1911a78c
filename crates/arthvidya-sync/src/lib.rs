pub mod config;
pub mod git;
pub mod sync_loop;
pub mod transport;

pub use config::SyncConfig;
pub use git::GitTransport;
pub use sync_loop::{CycleOutcome, SyncLoop, SyncStatus, tracked_files};
pub use transport::{PushOutcome, SyncError, SyncPhase, Transport};
