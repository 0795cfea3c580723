pub mod codec;
pub mod config;
pub mod errors;
pub mod file_store;
pub mod format;
pub mod ids;
pub mod item;
pub mod items;
pub mod list;
pub mod lists;
pub mod locks;
pub mod models;
pub mod reorder;
pub mod service;
pub mod transaction;

pub use crate::config::TrackerConfig;
pub use crate::errors::{AppError, AppResult, ErrorKind};
pub use crate::file_store::{FileStore, Storage};
pub use crate::item::{Item, ItemCounter, ItemJournal, ItemOp, ItemSum};
pub use crate::list::List;
pub use crate::lists::{Lists, ListsCache, LISTS_FILE};
pub use crate::models::{Element, Entry, ItemDetails, ItemType, ListInfo, Mutation, NewItem};
pub use crate::reorder::{ReorderSession, Reorderable};
pub use crate::service::TrackerService;
pub use crate::transaction::Persist;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the process-wide JSON log writer under `<data_dir>/logs`.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(data_dir: &Path) -> AppResult<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "tracker.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::WriteFailed(format!("cannot install log subscriber: {}", error)))
}
