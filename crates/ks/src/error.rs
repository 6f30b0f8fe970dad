//! KS 错误定义

use thiserror::Error;

/// KS 错误类型
///
/// 密钥托管相关的失败都在这里穷举，调用方按变体分支而不是按错误文本分支。
#[derive(Error, Debug)]
pub enum KsError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 租户没有处于激活状态的签名密钥
    #[error("No active signing key for tenant {0}")]
    NoActiveKey(String),

    /// 密钥 PEM 无法解析或不满足要求
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// 信封认证失败（篡改、主密钥错误、salt 错误）
    ///
    /// 不携带任何明文片段
    #[error("Decryption failed")]
    DecryptionFailed,

    /// 信封格式错误（base64 非法或长度不足）
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// 加密过程错误（随机数源、cipher 初始化）
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

/// KS 结果类型别名
pub type KsResult<T> = Result<T, KsError>;
