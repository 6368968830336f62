use chrono::Utc;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::config::{Config, PASSWORD_HASH_ROUNDS};
use crate::error::{AppError, Result};
use crate::types::{Role, TokenKind};

type HmacSha256 = Hmac<Sha256>;

/// PBKDF2 output length in bytes.
const PASSWORD_HASH_LEN: usize = 32;
const TOKEN_SEPARATOR: char = '.';

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub kind: TokenKind,
    /// Unix seconds.
    pub exp: i64,
    /// Unique per token, so two tokens issued in the same second still differ.
    pub jti: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Password hashing plus bearer token signing and revocation.
///
/// Tokens are `hex(claims_json).hex(hmac_sha256(claims_json))`. Revoked tokens
/// are remembered by signature until their own expiry.
pub struct CredentialService {
    secret: Vec<u8>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    revoked: DashMap<String, i64>,
}

impl CredentialService {
    pub fn new(secret: &str, access_minutes: i64, refresh_days: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            access_ttl_secs: access_minutes * 60,
            refresh_ttl_secs: refresh_days * 86_400,
            revoked: DashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.access_token_minutes, config.refresh_token_days)
    }

    // -----------------------------------------------------------------------
    // Passwords
    // -----------------------------------------------------------------------

    /// PHC string (`$pbkdf2-sha256$i=..,l=32$salt$hash`) with a fresh random salt.
    /// The key derivation runs on the blocking pool.
    pub async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || derive_phc(&password)).await?
    }

    /// False for a wrong password or a stored hash that does not parse.
    pub async fn verify_password(&self, password: &str, stored: &str) -> Result<bool> {
        let (password, stored) = (password.to_string(), stored.to_string());
        let matched = tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&stored) else {
                return false;
            };
            Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
        })
        .await?;
        Ok(matched)
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    pub fn issue(&self, sub: i64, username: &str, role: Role, kind: TokenKind) -> Result<String> {
        self.issue_at(sub, username, role, kind, Utc::now().timestamp())
    }

    pub fn issue_pair(&self, sub: i64, username: &str, role: Role) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(sub, username, role, TokenKind::Access)?,
            refresh_token: self.issue(sub, username, role, TokenKind::Refresh)?,
            token_type: "bearer",
            expires_in: self.access_ttl_secs,
        })
    }

    pub fn issue_at(&self, sub: i64, username: &str, role: Role, kind: TokenKind, now: i64) -> Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub,
            username: username.to_string(),
            role,
            kind,
            exp: now + ttl,
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };
        let payload = serde_json::to_vec(&claims)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        Ok(format!("{}{TOKEN_SEPARATOR}{}", hex::encode(payload), hex::encode(signature)))
    }

    /// Checks signature, kind, expiry and revocation.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        self.verify_at(token, kind, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, kind: TokenKind, now: i64) -> Result<Claims> {
        let (payload_hex, signature_hex) = token.split_once(TOKEN_SEPARATOR).ok_or_else(invalid_token)?;
        let payload = hex::decode(payload_hex).map_err(|_| invalid_token())?;
        let signature = hex::decode(signature_hex).map_err(|_| invalid_token())?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| invalid_token())?;

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid_token())?;
        if claims.kind != kind || claims.exp <= now {
            return Err(invalid_token());
        }
        if self.revoked.contains_key(signature_hex) {
            debug!(sub = claims.sub, "rejected revoked token");
            return Err(invalid_token());
        }
        Ok(claims)
    }

    /// Exchange a refresh token for a new pair. The presented token is revoked.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        self.revoke(refresh_token, claims.exp);
        self.issue_pair(claims.sub, &claims.username, claims.role)
    }

    pub fn revoke(&self, token: &str, exp: i64) {
        if let Some((_, signature_hex)) = token.split_once(TOKEN_SEPARATOR) {
            self.revoked.insert(signature_hex.to_string(), exp);
        }
    }

    /// Drop revocations whose token has expired anyway. Returns how many were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.revoked.len();
        self.revoked.retain(|_, exp| *exp > now);
        before - self.revoked.len()
    }

    #[cfg(test)]
    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| AppError::Config(format!("signing key: {e}")))
    }
}

fn invalid_token() -> AppError {
    AppError::Unauthorized("Invalid token".to_string())
}

fn derive_phc(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes()).map_err(hash_error)?;
    let params = Params { rounds: PASSWORD_HASH_ROUNDS, output_length: PASSWORD_HASH_LEN };
    let hash = Pbkdf2
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(hash_error)?;
    Ok(hash.to_string())
}

fn hash_error(e: pbkdf2::password_hash::Error) -> AppError {
    AppError::PasswordHash(e.to_string())
}
