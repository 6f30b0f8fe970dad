//! 密钥运维操作
//!
//! - `seal`: 用配置的主密钥封装 PEM 私钥，输出信封（base64）
//! - `import-key`: 校验密钥对、封装私钥并写入为租户当前激活密钥

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use iam::TokenService;
use ks::{KeyRepository, KeyStorage, SigningKey, TenantSigningKey, VerificationKey};
use tracing::info;

use crate::AuthrixConfig;

/// 导入密钥请求
#[derive(Debug, Clone)]
pub struct ImportKeyRequest {
    pub tenant_id: String,
    pub key_id: String,
    pub public_key_pem: String,
    pub private_key_pem: String,
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read PEM file: {}", path.display()))
}

/// 封装 PEM 私钥文件
pub fn seal_pem(config: &AuthrixConfig, pem_path: &Path) -> Result<String> {
    let pem = read_pem(pem_path)?;
    SigningKey::from_pem("seal", &pem).context("Input is not a usable RSA private key")?;

    let decryptor = config
        .services
        .ks
        .build_decryptor()
        .context("Failed to load master secret")?;
    decryptor.seal(&pem).context("Failed to seal private key")
}

/// 校验公私钥是否成对：签一个探测令牌再用公钥验证
fn check_key_pair(request: &ImportKeyRequest) -> Result<()> {
    let signing = SigningKey::from_pem(&request.key_id, &request.private_key_pem)
        .context("Invalid private key")?;
    let verification = VerificationKey::from_pem(&request.key_id, &request.public_key_pem)
        .context("Invalid public key")?;

    let tokens = TokenService::new(Default::default());
    let probe = tokens
        .issue_refresh_token("key-import-probe", 0, &signing)
        .context("Failed to sign probe token")?;
    if tokens.verify(&probe, &verification).is_err() {
        bail!("Public key does not match private key");
    }
    Ok(())
}

/// 导入租户签名密钥
///
/// 新密钥写入后即为激活状态，同一租户的旧密钥被停用。
pub async fn import_key(
    config: &AuthrixConfig,
    request: ImportKeyRequest,
) -> Result<TenantSigningKey> {
    if request.tenant_id.trim().is_empty() || request.key_id.trim().is_empty() {
        bail!("Tenant ID and key ID must not be empty");
    }
    check_key_pair(&request)?;

    let decryptor = config
        .services
        .ks
        .build_decryptor()
        .context("Failed to load master secret")?;
    let envelope = decryptor
        .seal(&request.private_key_pem)
        .context("Failed to seal private key")?;

    std::fs::create_dir_all(&config.sqlite_path).with_context(|| {
        format!(
            "Failed to create SQLite data directory: {}",
            config.sqlite_path.display()
        )
    })?;
    let storage = KeyStorage::from_config(&config.services.ks.storage, &config.sqlite_path)
        .await
        .context("Failed to open key storage")?;

    let record = TenantSigningKey {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: request.tenant_id,
        key_id: request.key_id,
        public_key_pem: request.public_key_pem,
        encrypted_private_key: envelope,
        algorithm: ks::types::DEFAULT_ALGORITHM.to_string(),
        is_active: true,
        created_at: Utc::now(),
    };
    storage
        .insert_key(&record)
        .await
        .context("Failed to store signing key")?;

    info!(
        "Imported signing key for tenant {}: kid={}, storage={}",
        record.tenant_id,
        record.key_id,
        storage.backend_name()
    );
    Ok(record)
}

/// 从文件读取密钥对并导入
pub async fn import_key_files(
    config: &AuthrixConfig,
    tenant_id: &str,
    key_id: &str,
    public_path: &Path,
    private_path: &Path,
) -> Result<TenantSigningKey> {
    let request = ImportKeyRequest {
        tenant_id: tenant_id.to_string(),
        key_id: key_id.to_string(),
        public_key_pem: read_pem(public_path)?,
        private_key_pem: read_pem(private_path)?,
    };
    import_key(config, request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const TENANT_A_PRIVATE: &str = include_str!("../testdata/tenant_a_private.pem");
    const TENANT_A_PUBLIC: &str = include_str!("../testdata/tenant_a_public.pem");
    const TENANT_B_PUBLIC: &str = include_str!("../testdata/tenant_b_public.pem");

    fn config(dir: &Path) -> AuthrixConfig {
        let mut config = AuthrixConfig::default();
        config.sqlite_path = dir.join("data");
        config.services.ks.master_secret = Some("keys-test-secret".to_string());
        config
    }

    fn request(public: &str) -> ImportKeyRequest {
        ImportKeyRequest {
            tenant_id: "project-0001".to_string(),
            key_id: "kid-1".to_string(),
            public_key_pem: public.to_string(),
            private_key_pem: TENANT_A_PRIVATE.to_string(),
        }
    }

    #[test]
    fn test_seal_pem_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());
        let pem_path = temp_dir.path().join("private.pem");
        std::fs::write(&pem_path, TENANT_A_PRIVATE).unwrap();

        let envelope = seal_pem(&config, &pem_path).unwrap();
        let decryptor = config.services.ks.build_decryptor().unwrap();
        assert_eq!(decryptor.decrypt(&envelope).unwrap().as_str(), TENANT_A_PRIVATE);
    }

    #[test]
    fn test_seal_rejects_non_key_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let pem_path = temp_dir.path().join("junk.pem");
        std::fs::write(&pem_path, "not a key").unwrap();
        assert!(seal_pem(&config(temp_dir.path()), &pem_path).is_err());
    }

    #[tokio::test]
    async fn test_import_key_becomes_active() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());

        let record = import_key(&config, request(TENANT_A_PUBLIC)).await.unwrap();
        assert!(record.is_active);

        let custodian = ks::create_key_custodian(&config.services.ks, &config.sqlite_path)
            .await
            .unwrap();
        let signing = custodian.signing_key("project-0001").await.unwrap();
        assert_eq!(signing.key_id, "kid-1");
    }

    #[tokio::test]
    async fn test_import_key_rejects_mismatched_pair() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = import_key(&config(temp_dir.path()), request(TENANT_B_PUBLIC))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
