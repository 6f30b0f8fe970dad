//! KS 数据类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 默认签名算法
pub const DEFAULT_ALGORITHM: &str = "RS256";

/// 租户签名密钥记录
///
/// 由外部密钥供应流程写入，本服务只读取；私钥字段始终是信封密文。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSigningKey {
    /// 记录 ID
    pub id: String,
    /// 所属租户
    pub tenant_id: String,
    /// JWT header 中的 kid
    pub key_id: String,
    /// 公钥 PEM（SPKI 或 PKCS#1）
    pub public_key_pem: String,
    /// 信封加密后的私钥（base64）
    pub encrypted_private_key: String,
    /// 签名算法，目前只支持 RS256
    pub algorithm: String,
    /// 是否为租户当前使用的密钥
    pub is_active: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for TenantSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantSigningKey")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
