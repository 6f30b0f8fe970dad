//! 租户签名密钥托管
//!
//! 每次请求从仓库读取租户激活密钥，解开信封后立即转换为 `EncodingKey`，
//! 明文 PEM 不出本函数、不缓存。

use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, warn};

use crate::crypto::EnvelopeDecryptor;
use crate::error::{KsError, KsResult};
use crate::storage::KeyRepository;
use crate::types::{DEFAULT_ALGORITHM, TenantSigningKey};

/// RSA 密钥最小位数
pub const MIN_RSA_BITS: usize = 2048;

/// 用于签发 token 的私钥
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub encoding_key: EncodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// 从 PEM 私钥（PKCS#1 或 PKCS#8）构建
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> KsResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem.trim())
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem.trim()))
            .map_err(|e| KsError::InvalidKeyMaterial(format!("unparseable private key: {e}")))?;

        check_modulus(private_key.size())?;

        let der = private_key
            .to_pkcs1_der()
            .map_err(|e| KsError::InvalidKeyMaterial(format!("private key encoding: {e}")))?;

        Ok(Self {
            key_id: key_id.into(),
            encoding_key: EncodingKey::from_rsa_der(der.as_bytes()),
        })
    }
}

/// 用于校验 token 的公钥
#[derive(Clone)]
pub struct VerificationKey {
    pub key_id: String,
    pub decoding_key: DecodingKey,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// 从 PEM 公钥（SPKI 或 PKCS#1）构建
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> KsResult<Self> {
        let public_key = RsaPublicKey::from_public_key_pem(pem.trim())
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem.trim()))
            .map_err(|e| KsError::InvalidKeyMaterial(format!("unparseable public key: {e}")))?;

        check_modulus(public_key.size())?;

        let der = public_key
            .to_pkcs1_der()
            .map_err(|e| KsError::InvalidKeyMaterial(format!("public key encoding: {e}")))?;

        Ok(Self {
            key_id: key_id.into(),
            decoding_key: DecodingKey::from_rsa_der(der.as_bytes()),
        })
    }
}

fn check_modulus(size_bytes: usize) -> KsResult<()> {
    let bits = size_bytes * 8;
    if bits < MIN_RSA_BITS {
        return Err(KsError::InvalidKeyMaterial(format!(
            "RSA key too small: {bits} bits (minimum {MIN_RSA_BITS})"
        )));
    }
    Ok(())
}

fn check_algorithm(record: &TenantSigningKey) -> KsResult<()> {
    if record.algorithm != DEFAULT_ALGORITHM {
        return Err(KsError::InvalidKeyMaterial(format!(
            "unsupported algorithm {} for key {}",
            record.algorithm, record.key_id
        )));
    }
    Ok(())
}

/// 密钥托管器
///
/// 持有密钥仓库与信封解密器，由应用启动时构建一次并在请求间共享。
#[derive(Clone)]
pub struct KeyCustodian {
    repository: Arc<dyn KeyRepository>,
    decryptor: EnvelopeDecryptor,
}

impl std::fmt::Debug for KeyCustodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCustodian")
            .field("decryptor", &self.decryptor)
            .finish_non_exhaustive()
    }
}

impl KeyCustodian {
    pub fn new(repository: Arc<dyn KeyRepository>, decryptor: EnvelopeDecryptor) -> Self {
        Self {
            repository,
            decryptor,
        }
    }

    /// 底层密钥仓库
    pub fn repository(&self) -> &Arc<dyn KeyRepository> {
        &self.repository
    }

    /// 信封解密器
    pub fn decryptor(&self) -> &EnvelopeDecryptor {
        &self.decryptor
    }

    async fn active_record(&self, tenant_id: &str) -> KsResult<TenantSigningKey> {
        let record = self
            .repository
            .active_key(tenant_id)
            .await?
            .ok_or_else(|| KsError::NoActiveKey(tenant_id.to_string()))?;
        check_algorithm(&record)?;
        Ok(record)
    }

    /// 获取租户签名私钥
    ///
    /// PBKDF2 与 RSA 解析是 CPU 密集操作，放到 blocking 线程池执行。
    pub async fn signing_key(&self, tenant_id: &str) -> KsResult<SigningKey> {
        let record = self.active_record(tenant_id).await?;
        let decryptor = self.decryptor.clone();
        let TenantSigningKey {
            key_id,
            encrypted_private_key,
            ..
        } = record;

        let key = tokio::task::spawn_blocking(move || {
            let pem = decryptor.decrypt(&encrypted_private_key)?;
            SigningKey::from_pem(key_id, &pem)
        })
        .await
        .map_err(|e| KsError::Internal(format!("Key decryption task failed: {e}")))?;

        match &key {
            Ok(k) => debug!("Loaded signing key for tenant {}: kid={}", tenant_id, k.key_id),
            Err(e) => warn!("Failed to load signing key for tenant {}: {}", tenant_id, e),
        }
        key
    }

    /// 获取租户校验公钥
    pub async fn verification_key(&self, tenant_id: &str) -> KsResult<VerificationKey> {
        let record = self.active_record(tenant_id).await?;
        VerificationKey::from_pem(record.key_id, &record.public_key_pem)
    }
}
