//! Key Store (KS) - 租户签名密钥托管
//!
//! KS 提供以下功能：
//! 1. 读取租户当前激活的 RSA 签名密钥记录
//! 2. 使用进程级主密钥解开信封加密的私钥（PBKDF2-HMAC-SHA512 + AES-256-GCM）
//! 3. 将密钥转换为 JWT 签名/校验密钥，明文不落盘、不缓存
//! 4. 多存储后端支持：SQLite, PostgreSQL

pub mod config;
pub mod crypto;
pub mod custodian;
pub mod error;
pub mod storage;
pub mod types;

use std::path::Path;
use std::sync::Arc;

// Re-export commonly used items
pub use config::KsServiceConfig;
pub use crypto::{EnvelopeDecryptor, MasterSecretSource};
pub use custodian::{KeyCustodian, SigningKey, VerificationKey};
pub use error::{KsError, KsResult};
pub use storage::{KeyRepository, KeyStorage, StorageConfig};
pub use types::TenantSigningKey;

/// 根据配置构建密钥托管器
///
/// # Arguments
/// * `config` - KS 服务配置
/// * `db_dir` - SQLite 数据库目录（来自 AuthrixConfig.sqlite_path）
pub async fn create_key_custodian<P: AsRef<Path>>(
    config: &KsServiceConfig,
    db_dir: P,
) -> KsResult<KeyCustodian> {
    let decryptor = config.build_decryptor()?;
    let storage = KeyStorage::from_config(&config.storage, db_dir).await?;

    tracing::info!(
        "Key custodian ready with {} key storage",
        storage.backend_name()
    );

    Ok(KeyCustodian::new(Arc::new(storage), decryptor))
}
