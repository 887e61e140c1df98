//! 探查服务核心：错误类型、数据模型、协作方接口与结构化日志

pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use errors::*;
pub use logging::StructuredLogger;
pub use models::*;
pub use traits::*;
