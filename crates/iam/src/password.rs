//! 密码哈希
//!
//! Argon2id（t=1, m=64 MiB, p=4）输出 32 字节，存储格式：
//!
//! ```text
//! base64(salt) "." base64(hash)
//! ```
//!
//! base64 使用标准字母表、不带填充。参数固定，不写入存储格式。

use argon2::{Algorithm, Argon2, Params, Version};
use base64::prelude::*;
use once_cell::sync::Lazy;
use rand::{RngCore, rngs::OsRng};

use crate::error::{AuthError, AuthResult};

const ARGON2_MEMORY_KB: u32 = 65536;
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const HASH_LENGTH: usize = 32;
const SALT_LENGTH: usize = 16;

fn argon2(output_len: usize) -> AuthResult<Argon2<'static>> {
    let params = Params::new(
        ARGON2_MEMORY_KB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(output_len),
    )
    .map_err(|e| AuthError::Internal(format!("Invalid Argon2 params: {e}")))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// 计算密码哈希
///
/// 每次调用生成新的随机 salt，相同密码的两次结果不同。
pub fn hash_password(password: &str) -> AuthResult<String> {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| AuthError::Internal(format!("Failed to generate salt: {e}")))?;

    let mut hash = [0u8; HASH_LENGTH];
    argon2(HASH_LENGTH)?
        .hash_password_into(password.as_bytes(), &salt, &mut hash)
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {e}")))?;

    Ok(format!(
        "{}.{}",
        BASE64_STANDARD_NO_PAD.encode(salt),
        BASE64_STANDARD_NO_PAD.encode(hash)
    ))
}

/// 校验密码
///
/// 不匹配返回 `Ok(false)`；存储值格式错误返回 `MalformedHash`。
pub fn verify_password(encoded: &str, password: &str) -> AuthResult<bool> {
    let mut parts = encoded.split('.');
    let (Some(salt_b64), Some(hash_b64), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedHash);
    };

    let salt = BASE64_STANDARD_NO_PAD
        .decode(salt_b64)
        .map_err(|_| AuthError::MalformedHash)?;
    let expected = BASE64_STANDARD_NO_PAD
        .decode(hash_b64)
        .map_err(|_| AuthError::MalformedHash)?;
    if salt.is_empty() || expected.is_empty() {
        return Err(AuthError::MalformedHash);
    }

    let mut computed = vec![0u8; expected.len()];
    // salt 或输出长度不满足 Argon2 要求同样视为存储值损坏
    argon2(expected.len())
        .map_err(|_| AuthError::MalformedHash)?
        .hash_password_into(password.as_bytes(), &salt, &mut computed)
        .map_err(|_| AuthError::MalformedHash)?;

    Ok(constant_time_eq(&computed, &expected))
}

/// 在 blocking 线程池中计算哈希
pub async fn hash_password_blocking(password: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {e}")))?
}

/// 在 blocking 线程池中校验密码
pub async fn verify_password_blocking(encoded: String, password: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&encoded, &password))
        .await
        .map_err(|e| AuthError::Internal(format!("Password verification task failed: {e}")))?
}

/// 未知邮箱登录时校验的固定哈希，首次使用时生成
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("authrix-unknown-account").ok());

/// 对固定哈希跑一次完整校验并丢弃结果
///
/// 未知邮箱与密码错误两条路径耗时一致，避免通过响应时间枚举邮箱。
pub async fn verify_dummy_blocking(password: String) -> AuthResult<()> {
    tokio::task::spawn_blocking(move || {
        if let Some(encoded) = DUMMY_HASH.as_ref() {
            let _ = verify_password(encoded, &password);
        }
    })
    .await
    .map_err(|e| AuthError::Internal(format!("Password verification task failed: {e}")))
}

/// 常量时间比较
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
