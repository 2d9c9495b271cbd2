//! Command key to input source mappings
//!
//! The manager is constructed once in `main` and shared behind a tokio
//! `RwLock`: the IPC server reads and writes it, the layout switcher only
//! reads.

mod manager;
mod store;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use manager::{InputSourceManager, MappingError};
pub use store::PreferenceStore;

/// Handle to the process-wide [`InputSourceManager`]
pub type SharedManager = Arc<RwLock<InputSourceManager>>;
