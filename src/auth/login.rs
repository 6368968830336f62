use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::credentials::{CredentialService, TokenPair};
use crate::config::{Config, ACCOUNT_LOCK_MINUTES, DEFAULT_ADMIN_PASSWORD, DEFAULT_JWT_SECRET, MAX_LOGIN_ATTEMPTS};
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::types::{Role, STATUS_ACTIVE};

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: i64,
    pub username: String,
    pub mobile: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: AccountSummary,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".to_string())
}

/// Password login for end users, with lockout after repeated failures.
pub async fn login_user(store: &Store, creds: &CredentialService, username: &str, password: &str) -> Result<LoginOutcome> {
    let user = store.user_by_username(username).await?.ok_or_else(invalid_credentials)?;

    let now = Utc::now();
    if user.account_locked_until.is_some_and(|until| until > now) {
        return Err(AppError::Forbidden("Account locked".to_string()));
    }

    if !creds.verify_password(password, &user.password_hash).await? {
        let attempts = user.login_attempts + 1;
        let locked_until = (attempts >= MAX_LOGIN_ATTEMPTS).then(|| now + Duration::minutes(ACCOUNT_LOCK_MINUTES));
        if locked_until.is_some() {
            warn!(user_id = user.id, attempts, "locking account after failed logins");
        }
        // Counter restarts once a lock is placed.
        let stored_attempts = if locked_until.is_some() { 0 } else { attempts };
        store.record_login_failure(user.id, stored_attempts, locked_until).await?;
        return Err(invalid_credentials());
    }

    if user.status != STATUS_ACTIVE {
        return Err(AppError::Forbidden("User account is inactive".to_string()));
    }

    store.record_login_success(user.id).await?;
    info!(user_id = user.id, "user logged in");

    Ok(LoginOutcome {
        tokens: creds.issue_pair(user.id, &user.username, Role::User)?,
        user: AccountSummary { id: user.id, username: user.username, mobile: Some(user.mobile) },
    })
}

pub async fn login_admin(store: &Store, creds: &CredentialService, username: &str, password: &str) -> Result<LoginOutcome> {
    let admin = store.admin_by_username(username).await?.ok_or_else(invalid_credentials)?;
    if !creds.verify_password(password, &admin.password_hash).await? {
        return Err(invalid_credentials());
    }
    if admin.status != STATUS_ACTIVE {
        return Err(AppError::Forbidden("Admin account is inactive".to_string()));
    }

    info!(admin_id = admin.id, "admin logged in");
    Ok(LoginOutcome {
        tokens: creds.issue_pair(admin.id, &admin.username, Role::Admin)?,
        user: AccountSummary { id: admin.id, username: admin.username, mobile: None },
    })
}

/// Create the configured admin account when no admin exists yet. Returns true if one was created.
pub async fn seed_admin(store: &Store, creds: &CredentialService, config: &Config) -> Result<bool> {
    if config.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("JWT_SECRET is the built-in default; set it before exposing the service");
    }
    if store.count_admins().await? > 0 {
        return Ok(false);
    }
    if config.admin_password == DEFAULT_ADMIN_PASSWORD {
        warn!(username = %config.admin_username, "seeding admin with the default password");
    }
    let hash = creds.hash_password(&config.admin_password).await?;
    store.create_admin(&config.admin_username, &hash).await?;
    info!(username = %config.admin_username, "bootstrap admin created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewUser;
    use crate::types::STATUS_INACTIVE;

    async fn setup() -> (Store, CredentialService, i64) {
        let store = Store::in_memory().await;
        let creds = CredentialService::new("test-secret", 30, 7);
        let id = store
            .create_user(&NewUser {
                username: "user1".to_string(),
                mobile: "9999999999".to_string(),
                email: None,
                password_hash: creds.hash_password("Secret123").await.unwrap(),
            })
            .await
            .unwrap();
        (store, creds, id)
    }

    #[tokio::test]
    async fn good_password_logs_in_and_resets_counter() {
        let (store, creds, id) = setup().await;
        store.record_login_failure(id, 3, None).await.unwrap();

        let outcome = login_user(&store, &creds, "user1", "Secret123").await.unwrap();
        assert_eq!(outcome.user.id, id);
        assert_eq!(outcome.tokens.token_type, "bearer");

        let user = store.user_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.login_attempts, 0);
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn unknown_user_and_bad_password_look_the_same() {
        let (store, creds, _) = setup().await;
        let a = login_user(&store, &creds, "nobody", "Secret123").await.unwrap_err();
        let b = login_user(&store, &creds, "user1", "wrong").await.unwrap_err();
        assert_eq!(a.to_string(), "Invalid credentials");
        assert_eq!(b.to_string(), "Invalid credentials");
    }

    #[tokio::test]
    async fn fifth_failure_locks_the_account() {
        let (store, creds, id) = setup().await;
        for _ in 0..MAX_LOGIN_ATTEMPTS {
            let err = login_user(&store, &creds, "user1", "wrong").await.unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
        let user = store.user_by_id(id).await.unwrap().unwrap();
        assert!(user.account_locked_until.is_some());

        // Even the right password is refused while locked.
        let err = login_user(&store, &creds, "user1", "Secret123").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m == "Account locked"), "got {err:?}");
    }

    #[tokio::test]
    async fn inactive_user_is_forbidden() {
        let (store, creds, id) = setup().await;
        store.set_user_status(id, STATUS_INACTIVE).await.unwrap();
        let err = login_user(&store, &creds, "user1", "Secret123").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn seeded_admin_can_log_in_once_seeded() {
        let store = Store::in_memory().await;
        let creds = CredentialService::new("test-secret", 30, 7);
        let config = Config::for_tests();

        assert!(seed_admin(&store, &creds, &config).await.unwrap());
        assert!(!seed_admin(&store, &creds, &config).await.unwrap());

        let outcome = login_admin(&store, &creds, "admin", "Admin123").await.unwrap();
        let claims = creds.verify(&outcome.tokens.access_token, crate::types::TokenKind::Access).unwrap();
        assert_eq!(claims.role, Role::Admin);

        assert!(login_admin(&store, &creds, "admin", "admin").await.is_err());
        assert!(login_admin(&store, &creds, "user1", "Admin123").await.is_err());
    }
}
