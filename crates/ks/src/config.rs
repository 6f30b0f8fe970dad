//! Key Store (KS) 配置
//!
//! KS 负责读取租户签名密钥记录并用进程级主密钥解开加密的私钥

use crate::crypto::{EnvelopeDecryptor, MasterSecretSource};
use crate::error::{KsError, KsResult};
use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};

/// KS 服务配置
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct KsServiceConfig {
    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 主密钥 - 直接配置
    ///
    /// 用于派生信封解密密钥，与外部写入方使用的加密密钥一致。
    ///
    /// 注意：直接在配置文件中存储主密钥不够安全，生产环境建议使用 master_secret_env 或 master_secret_file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_secret: Option<String>,

    /// 主密钥环境变量名称
    ///
    /// 例如：master_secret_env = "AUTHRIX_MASTER_SECRET"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_secret_env: Option<String>,

    /// 主密钥文件路径
    ///
    /// 文件权限应设置为 600 (仅所有者可读写)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_secret_file: Option<String>,
}

impl KsServiceConfig {
    /// 获取主密钥来源
    ///
    /// 优先级: master_secret_file > master_secret_env > master_secret
    pub fn get_master_secret_source(&self) -> Option<MasterSecretSource> {
        if let Some(path) = &self.master_secret_file {
            return Some(MasterSecretSource::File(path.clone()));
        }

        if let Some(env_var) = &self.master_secret_env {
            return Some(MasterSecretSource::Environment(env_var.clone()));
        }

        if let Some(secret) = &self.master_secret {
            return Some(MasterSecretSource::Direct(secret.clone()));
        }

        None
    }

    /// 根据配置构建信封解密器
    ///
    /// 未配置任何主密钥来源时返回配置错误，不存在无加密模式。
    pub fn build_decryptor(&self) -> KsResult<EnvelopeDecryptor> {
        let source = self.get_master_secret_source().ok_or_else(|| {
            KsError::Config(
                "No master secret configured: set master_secret_file, master_secret_env or master_secret"
                    .into(),
            )
        })?;
        EnvelopeDecryptor::from_source(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteConfig, StorageBackend};

    #[test]
    fn test_default_ks_service_config() {
        let config = KsServiceConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.get_master_secret_source().is_none());
        assert!(matches!(config.build_decryptor(), Err(KsError::Config(_))));
    }

    #[test]
    fn test_serialize_ks_service_config() {
        let config = KsServiceConfig {
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                sqlite: Some(SqliteConfig {
                    path: "custom.db".to_string(),
                    ..Default::default()
                }),
                postgres: None,
            },
            master_secret_env: Some("AUTHRIX_MASTER_SECRET".to_string()),
            ..Default::default()
        };

        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("master_secret_env = \"AUTHRIX_MASTER_SECRET\""));
        assert!(!toml.contains("master_secret_file"));
        assert!(toml.contains("path = \"custom.db\""));
    }

    #[test]
    fn test_master_secret_source_priority() {
        let config = KsServiceConfig {
            master_secret: Some("inline".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.get_master_secret_source(),
            Some(MasterSecretSource::Direct("inline".to_string()))
        );

        let config = KsServiceConfig {
            master_secret: Some("inline".to_string()),
            master_secret_env: Some("TEST_ENV".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.get_master_secret_source(),
            Some(MasterSecretSource::Environment("TEST_ENV".to_string()))
        );

        let config = KsServiceConfig {
            master_secret: Some("inline".to_string()),
            master_secret_env: Some("TEST_ENV".to_string()),
            master_secret_file: Some("/path/to/secret".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.get_master_secret_source(),
            Some(MasterSecretSource::File("/path/to/secret".to_string()))
        );
    }

    #[test]
    fn test_build_decryptor_from_inline_secret() {
        let config = KsServiceConfig {
            master_secret: Some("inline-secret".to_string()),
            ..Default::default()
        };
        assert!(config.build_decryptor().is_ok());
    }
}
