/// Database access layer
pub mod replica;
pub mod tasks;

pub use replica::{PgReplicaStore, ReplicaDirectory, ReplicaStore};
pub use tasks::{PgTaskRepository, TaskRepository};
