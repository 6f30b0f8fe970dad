//! Authrix 通用基础设施库
//!
//! 为凭证服务各组件提供统一的配置加载、校验与错误类型

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::AuthrixConfig;
pub use error::{ConfigError, Result};
