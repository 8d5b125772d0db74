//! Shared remote store abstraction and implementations.

mod memory;
mod redis;
mod traits;

pub use self::redis::{RedisStore, create_pool};
pub use memory::MemoryStore;
pub use traits::RemoteStore;
