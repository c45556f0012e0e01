pub mod error;
pub mod game;
pub mod task;

// Re-export commonly used types
pub use error::{Cancelled, DownloadError, ManifestError};
pub use game::installer::{DependencyManager, GameBuilder, InstallerConfig, ProxyConfig};
pub use game::repository::{DefaultGameRepository, GameRepository};
pub use game::version::{Library, Version};
pub use game::Tool;
pub use task::{Outcome, ResultKey, Scheduler, Task, TaskContext, TaskExecutor};
