pub mod checkpoint;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod filter;
pub mod notifier;
pub mod watcher;

pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use classifier::{classify, EventKind, LogEvent};
pub use cli::Args;
pub use config::{Config, WatchConfig};
pub use filter::should_notify;
pub use notifier::{Notifier, SlackNotifier};
pub use watcher::LogWatcher;
