//! Async task manager: id pool, bounded workers, polling contract.

pub mod id_pool;
pub mod manager;
pub mod model;

pub use id_pool::IdPool;
pub use manager::TaskManager;
pub use model::{TaskState, TaskStatus};
