pub mod app_config;
pub mod lock;
pub mod message_queue;
pub mod observability;
pub mod resolver;
pub mod scheduler;

pub use app_config::*;
pub use lock::*;
pub use message_queue::*;
pub use observability::*;
pub use resolver::*;
pub use scheduler::*;
