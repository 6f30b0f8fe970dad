//! 集成测试公共夹具：临时 SQLite + 两个已供应签名密钥的租户

#![allow(dead_code)]

use std::sync::Arc;

use authrix_common::config::{BackoffConfig, TokenConfig};
use chrono::Utc;
use iam::{BackoffGuard, CredentialService, TokenService, UserStorage, backoff::MemoryBackoffStore};
use ks::storage::{SqliteConfig, StorageBackend};
use ks::{KeyCustodian, KsServiceConfig, StorageConfig, TenantSigningKey, create_key_custodian};
use tempfile::TempDir;

pub const TENANT_A: &str = "project-aaaa-0001";
pub const TENANT_B: &str = "project-bbbb-0002";
/// 没有任何签名密钥的租户
pub const TENANT_NO_KEY: &str = "project-none-0003";
pub const PROVIDER: &str = "provider-0001";

const TENANT_A_PRIVATE: &str = include_str!("../../../../testdata/tenant_a_private.pem");
const TENANT_A_PUBLIC: &str = include_str!("../../../../testdata/tenant_a_public.pem");
const TENANT_B_PRIVATE: &str = include_str!("../../../../testdata/tenant_b_private.pem");
const TENANT_B_PUBLIC: &str = include_str!("../../../../testdata/tenant_b_public.pem");

pub struct TestEnv {
    pub _temp_dir: TempDir,
    pub users: Arc<UserStorage>,
    pub custodian: KeyCustodian,
    pub service: CredentialService,
}

pub fn storage_config() -> StorageConfig {
    StorageConfig {
        backend: StorageBackend::Sqlite,
        sqlite: Some(SqliteConfig::default()),
        postgres: None,
    }
}

pub async fn provision_keys(custodian: &KeyCustodian) {
    let decryptor = custodian.decryptor().clone();
    for (tenant, kid, private, public) in [
        (TENANT_A, "kid-a", TENANT_A_PRIVATE, TENANT_A_PUBLIC),
        (TENANT_B, "kid-b", TENANT_B_PRIVATE, TENANT_B_PUBLIC),
    ] {
        let record = TenantSigningKey {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            key_id: kid.to_string(),
            public_key_pem: public.to_string(),
            encrypted_private_key: decryptor.seal(private).expect("seal should succeed"),
            algorithm: "RS256".to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        custodian
            .repository()
            .insert_key(&record)
            .await
            .expect("insert key should succeed");
    }
}

pub async fn setup() -> TestEnv {
    setup_with(BackoffConfig::default()).await
}

pub async fn setup_with(backoff: BackoffConfig) -> TestEnv {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let ks_config = KsServiceConfig {
        storage: storage_config(),
        master_secret: Some("iam-test-master-secret".to_string()),
        ..Default::default()
    };
    let custodian = create_key_custodian(&ks_config, temp_dir.path())
        .await
        .expect("Failed to create key custodian");
    provision_keys(&custodian).await;

    let users = Arc::new(
        UserStorage::from_config(&storage_config(), temp_dir.path())
            .await
            .expect("Failed to open user storage"),
    );

    let service = CredentialService::new(
        users.clone(),
        custodian.clone(),
        BackoffGuard::new(Arc::new(MemoryBackoffStore::new()), backoff),
        TokenService::new(TokenConfig::default()),
        8,
    );

    TestEnv {
        _temp_dir: temp_dir,
        users,
        custodian,
        service,
    }
}
