pub mod scripted_storage;

pub use scripted_storage::{ScriptedStorage, StorageCall};
