//! Publish/subscribe bus abstraction and implementations.

mod memory;
mod redis;
mod traits;

pub use self::redis::RedisBus;
pub use memory::MemoryBus;
pub use traits::{Bus, Subscription};
