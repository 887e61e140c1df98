pub mod in_memory_queue;
pub mod lock;
pub mod memory;
pub mod observability;

pub use in_memory_queue::InMemoryMessageQueue;
pub use lock::{InMemoryDistributedLock, LockFactory, RedisDistributedLock};
pub use memory::*;
pub use observability::ExploreMetrics;
