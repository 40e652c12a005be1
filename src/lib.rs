pub mod config;
pub mod dead_letter;
pub mod error;
pub mod queue;
pub mod repository;
pub mod store;
pub mod sync;
pub mod task;

pub use config::SyncConfig;
pub use error::{RepositoryError, SyncEngineError};
pub use repository::TaskRepository;
pub use store::Store;
pub use sync::engine::SyncEngine;
pub use sync::remote_client::{HttpRemoteClient, RemoteClient};
pub use task::{NewTask, SyncStatus, Task, TaskPatch};
