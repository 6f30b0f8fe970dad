//! 密钥存储后端抽象接口
//!
//! 定义了所有存储后端必须实现的统一异步接口

use crate::error::KsResult;
use crate::types::TenantSigningKey;
use async_trait::async_trait;

/// 租户签名密钥仓库
///
/// 所有存储后端（SQLite, PostgreSQL）都需要实现此 trait
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// 初始化存储后端
    ///
    /// 执行必要的初始化操作，如创建表、索引等
    async fn init(&self) -> KsResult<()>;

    /// 查询租户当前激活的签名密钥
    ///
    /// 同一租户存在多条激活记录时取最新创建的一条
    ///
    /// # Returns
    /// * `Ok(Some(key))` - 找到激活密钥
    /// * `Ok(None)` - 租户没有激活密钥
    /// * `Err(...)` - 存储错误
    async fn active_key(&self, tenant_id: &str) -> KsResult<Option<TenantSigningKey>>;

    /// 写入密钥记录
    ///
    /// 如果记录为激活状态，同一事务内停用该租户的其它密钥
    async fn insert_key(&self, key: &TenantSigningKey) -> KsResult<()>;
}
