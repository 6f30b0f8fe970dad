//! 凭证流程集成测试：CredentialService + SQLite + 内存退避存储

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use authrix_common::config::BackoffConfig;
use chrono::Utc;
use common::{PROVIDER, TENANT_A, TENANT_B, TENANT_NO_KEY, setup, setup_with};
use futures_util::future::join_all;
use iam::{AuthError, RegisterInput, Role, TenantUser, UserRepository};

fn input(email: &str, password: &str) -> RegisterInput {
    RegisterInput {
        name: "Alice".to_string(),
        email: email.to_string(),
        password: password.to_string(),
        role: None,
    }
}

#[tokio::test]
async fn test_register_login_refresh_and_stale_refresh() {
    let env = setup().await;
    let service = &env.service;

    let registered = service
        .register(TENANT_A, PROVIDER, input("Alice@Example.com", "correct horse"))
        .await
        .unwrap();
    assert_eq!(registered.user.email, "alice@example.com");
    assert_eq!(registered.user.role, Role::Member);
    assert_eq!(registered.user.tenant_id, TENANT_A);
    assert_eq!(registered.user.issuer_id, PROVIDER);
    assert!(!registered.user.is_verified);

    let session = service
        .login(TENANT_A, "alice@example.com", "correct horse")
        .await
        .unwrap();
    assert!(session.user.last_login_at.is_some());

    let me = service
        .authenticate(TENANT_A, &session.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(me.id, registered.user.id);
    assert_eq!(me.token_version, 0);

    let refreshed = service
        .refresh(TENANT_A, &session.tokens.refresh_token)
        .await
        .unwrap();

    // 同一刷新令牌不能使用两次
    assert!(matches!(
        service
            .refresh(TENANT_A, &session.tokens.refresh_token)
            .await,
        Err(AuthError::TokenRevoked)
    ));

    // 旧访问令牌随之失效，新令牌可用
    assert!(matches!(
        service
            .authenticate(TENANT_A, &session.tokens.access_token)
            .await,
        Err(AuthError::TokenRevoked)
    ));
    let me = service
        .authenticate(TENANT_A, &refreshed.access_token)
        .await
        .unwrap();
    assert_eq!(me.token_version, 1);

    service
        .refresh(TENANT_A, &refreshed.refresh_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_register_rejects_duplicate_email_within_tenant() {
    let env = setup().await;
    let service = &env.service;

    service
        .register(TENANT_A, PROVIDER, input("bob@example.com", "password-1"))
        .await
        .unwrap();

    assert!(matches!(
        service
            .register(TENANT_A, PROVIDER, input("  BOB@example.com ", "password-2"))
            .await,
        Err(AuthError::EmailTaken)
    ));

    // 其它租户可以使用同一邮箱
    let other = service
        .register(TENANT_B, PROVIDER, input("bob@example.com", "password-3"))
        .await
        .unwrap();
    assert_eq!(other.user.tenant_id, TENANT_B);
}

#[tokio::test]
async fn test_register_keeps_requested_role() {
    let env = setup().await;
    let session = env
        .service
        .register(
            TENANT_A,
            PROVIDER,
            RegisterInput {
                role: Some(Role::Owner),
                ..input("owner@example.com", "password-1")
            },
        )
        .await
        .unwrap();
    assert_eq!(session.user.role, Role::Owner);
}

#[tokio::test]
async fn test_register_validation() {
    let env = setup().await;
    let Err(AuthError::Validation(fields)) = env
        .service
        .register(TENANT_A, PROVIDER, input("not-an-email", "short"))
        .await
    else {
        panic!("expected validation error");
    };
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("password"));
}

#[tokio::test]
async fn test_register_without_signing_key_keeps_user() {
    let env = setup().await;

    assert!(matches!(
        env.service
            .register(TENANT_NO_KEY, PROVIDER, input("carol@example.com", "password-1"))
            .await,
        Err(AuthError::NoActiveKey(_))
    ));

    // 用户已写入，不做补偿删除
    assert!(
        env.users
            .exists_by_email(TENANT_NO_KEY, "carol@example.com")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let env = setup().await;
    env.service
        .register(TENANT_A, PROVIDER, input("dave@example.com", "password-1"))
        .await
        .unwrap();

    assert!(matches!(
        env.service
            .login(TENANT_A, "dave@example.com", "wrong-password")
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    assert!(matches!(
        env.service
            .login(TENANT_A, "nobody@example.com", "password-1")
            .await,
        Err(AuthError::InvalidCredentials)
    ));
    // 租户隔离：其它租户中不存在该用户
    assert!(matches!(
        env.service
            .login(TENANT_B, "dave@example.com", "password-1")
            .await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_unknown_email_login_costs_a_password_hash() {
    let env = setup().await;
    env.service
        .register(TENANT_A, PROVIDER, input("erin@example.com", "password-1"))
        .await
        .unwrap();

    // 预热：首次未知邮箱登录会生成固定哈希
    let _ = env
        .service
        .login(TENANT_A, "warmup@example.com", "password-1")
        .await;

    async fn average(env: &common::TestEnv, email: &str) -> Duration {
        let mut total = Duration::ZERO;
        for _ in 0..3 {
            let started = Instant::now();
            let result = env.service.login(TENANT_A, email, "wrong-password").await;
            total += started.elapsed();
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        }
        total / 3
    }

    let unknown = average(&env, "ghost@example.com").await;
    let wrong_password = average(&env, "erin@example.com").await;

    // 两条路径都跑一次 Argon2，耗时处于同一量级
    assert!(
        unknown * 4 >= wrong_password,
        "unknown={unknown:?} wrong_password={wrong_password:?}"
    );
}

#[tokio::test]
async fn test_login_backoff_escalation_and_reset() {
    let env = setup().await;
    let service = &env.service;
    service
        .register(TENANT_A, PROVIDER, input("erin@example.com", "password-1"))
        .await
        .unwrap();

    // 4 次失败后成功登录，计数清零
    for _ in 0..4 {
        assert!(matches!(
            service.login(TENANT_A, "erin@example.com", "nope-nope").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
    service
        .login(TENANT_A, "erin@example.com", "password-1")
        .await
        .unwrap();

    for _ in 0..4 {
        assert!(matches!(
            service.login(TENANT_A, "erin@example.com", "nope-nope").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
    service
        .login(TENANT_A, "erin@example.com", "password-1")
        .await
        .unwrap();

    // 连续 5 次失败触发封禁，正确密码也被拒绝
    for _ in 0..5 {
        assert!(matches!(
            service.login(TENANT_A, "erin@example.com", "nope-nope").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
    match service.login(TENANT_A, "ERIN@example.com", "password-1").await {
        Err(AuthError::TooManyAttempts { retry_after }) => {
            assert!((1..=30).contains(&retry_after), "retry_after={retry_after}")
        }
        other => panic!("expected TooManyAttempts, got {other:?}"),
    }

    // 封禁按租户隔离
    service
        .register(TENANT_B, PROVIDER, input("erin@example.com", "password-1"))
        .await
        .unwrap();
    service
        .login(TENANT_B, "erin@example.com", "password-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_email_failures_also_block() {
    let env = setup_with(BackoffConfig {
        threshold: 2,
        ..Default::default()
    })
    .await;

    for _ in 0..2 {
        assert!(matches!(
            env.service
                .login(TENANT_A, "ghost@example.com", "password-1")
                .await,
            Err(AuthError::InvalidCredentials)
        ));
    }
    assert!(matches!(
        env.service
            .login(TENANT_A, "ghost@example.com", "password-1")
            .await,
        Err(AuthError::TooManyAttempts { .. })
    ));
}

#[tokio::test]
async fn test_logout_revokes_every_session() {
    let env = setup().await;
    let service = &env.service;

    let first = service
        .register(TENANT_A, PROVIDER, input("frank@example.com", "password-1"))
        .await
        .unwrap();
    let second = service
        .login(TENANT_A, "frank@example.com", "password-1")
        .await
        .unwrap();

    service
        .logout(TENANT_A, &second.tokens.access_token)
        .await
        .unwrap();

    for session in [&first, &second] {
        assert!(matches!(
            service
                .authenticate(TENANT_A, &session.tokens.access_token)
                .await,
            Err(AuthError::TokenRevoked)
        ));
        assert!(matches!(
            service
                .refresh(TENANT_A, &session.tokens.refresh_token)
                .await,
            Err(AuthError::TokenRevoked)
        ));
    }

    // 重新登录得到可用的令牌
    let fresh = service
        .login(TENANT_A, "frank@example.com", "password-1")
        .await
        .unwrap();
    let user = service
        .authenticate(TENANT_A, &fresh.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(user.token_version, 1);
}

#[tokio::test]
async fn test_tokens_are_bound_to_tenant_key() {
    let env = setup().await;
    let session = env
        .service
        .register(TENANT_A, PROVIDER, input("grace@example.com", "password-1"))
        .await
        .unwrap();

    assert!(matches!(
        env.service
            .authenticate(TENANT_B, &session.tokens.access_token)
            .await,
        Err(AuthError::InvalidSignature)
    ));
    assert!(matches!(
        env.service
            .logout(TENANT_B, &session.tokens.access_token)
            .await,
        Err(AuthError::InvalidSignature)
    ));
    assert!(matches!(
        env.service
            .refresh(TENANT_B, &session.tokens.refresh_token)
            .await,
        Err(AuthError::InvalidRefreshToken)
    ));
}

#[tokio::test]
async fn test_garbage_tokens() {
    let env = setup().await;

    assert!(matches!(
        env.service.refresh(TENANT_A, "not.a.jwt").await,
        Err(AuthError::InvalidRefreshToken)
    ));
    assert!(matches!(
        env.service.logout(TENANT_A, "not.a.jwt").await,
        Err(AuthError::MalformedToken)
    ));
    assert!(matches!(
        env.service.refresh(TENANT_A, "").await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        env.service.authenticate(TENANT_NO_KEY, "not.a.jwt").await,
        Err(AuthError::NoActiveKey(_))
    ));
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let env = setup().await;
    let session = env
        .service
        .register(TENANT_A, PROVIDER, input("frank@example.com", "password-1"))
        .await
        .unwrap();

    assert!(matches!(
        env.service
            .refresh(TENANT_A, &session.tokens.access_token)
            .await,
        Err(AuthError::InvalidRefreshToken)
    ));

    // 被拒绝的请求不消耗版本，原刷新令牌仍然有效
    assert!(
        env.service
            .refresh(TENANT_A, &session.tokens.refresh_token)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_concurrent_refresh_has_single_winner() {
    let env = setup().await;
    let session = env
        .service
        .register(TENANT_A, PROVIDER, input("heidi@example.com", "password-1"))
        .await
        .unwrap();

    let service = Arc::new(env.service.clone());
    let handles = (0..10).map(|_| {
        let service = service.clone();
        let token = session.tokens.refresh_token.clone();
        tokio::spawn(async move { service.refresh(TENANT_A, &token).await })
    });

    let mut winners = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => winners += 1,
            Err(AuthError::TokenRevoked) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(winners, 1);

    let user = env
        .users
        .get_by_email(TENANT_A, "heidi@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.token_version, 1);
}

#[tokio::test]
async fn test_malformed_stored_hash_is_internal_error() {
    let env = setup().await;
    env.users
        .create(&TenantUser {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: TENANT_A.to_string(),
            issuer_id: PROVIDER.to_string(),
            name: "Ivan".to_string(),
            email: "ivan@example.com".to_string(),
            password_hash: "not-a-valid-hash".to_string(),
            role: Role::Member,
            is_verified: false,
            token_version: 0,
            created_at: Utc::now(),
            last_login_at: None,
        })
        .await
        .unwrap();

    let err = env
        .service
        .login(TENANT_A, "ivan@example.com", "password-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MalformedHash));
    assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_logout_for_deleted_user() {
    let env = setup().await;
    let session = env
        .service
        .register(TENANT_A, PROVIDER, input("judy@example.com", "password-1"))
        .await
        .unwrap();

    // 新建一个不含该用户的服务（同一密钥库，另一个用户库）
    let other_dir = tempfile::tempdir().unwrap();
    let users = iam::UserStorage::from_config(&common::storage_config(), other_dir.path())
        .await
        .unwrap();
    let service = iam::CredentialService::new(
        Arc::new(users),
        env.custodian.clone(),
        iam::BackoffGuard::new(
            Arc::new(iam::backoff::MemoryBackoffStore::new()),
            BackoffConfig::default(),
        ),
        iam::TokenService::new(Default::default()),
        8,
    );

    assert!(matches!(
        service.logout(TENANT_A, &session.tokens.access_token).await,
        Err(AuthError::UserNotFound)
    ));
    assert!(matches!(
        service.authenticate(TENANT_A, &session.tokens.access_token).await,
        Err(AuthError::UserNotFound)
    ));
    assert!(matches!(
        service.refresh(TENANT_A, &session.tokens.refresh_token).await,
        Err(AuthError::UserNotFound)
    ));
}
