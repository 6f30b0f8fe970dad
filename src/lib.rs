//! # authrix
//!
//! 多租户凭证签发与吊销服务：HTTP 服务装配与密钥运维操作

pub mod keys;
pub mod server;

// Re-export commonly used types
pub use authrix_common::config::AuthrixConfig;
pub use keys::{ImportKeyRequest, import_key, import_key_files, seal_pem};
pub use server::{serve, serve_with_listener};
