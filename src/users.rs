//! Credential registration and authentication.
//!
//! Argon2 hashing and verification are CPU-bound, so they run on tokio's
//! blocking pool rather than on the request's worker thread.

use std::sync::Arc;

use serde_json::json;
use sqlx::{Row, SqlitePool};
use tracing::info;
use zeroize::Zeroizing;

use lexvault_core::models::{ActionKind, Credential, Identity, Role};

use crate::audit::AuditLog;
use crate::crypto::{CryptoError, CryptoService};
use crate::error::{VaultError, VaultResult};

const MAX_USERNAME_CHARS: usize = 64;

pub struct UserDirectory {
    pool: SqlitePool,
    crypto: Arc<CryptoService>,
    audit: Arc<AuditLog>,
}

impl UserDirectory {
    pub fn new(pool: SqlitePool, crypto: Arc<CryptoService>, audit: Arc<AuditLog>) -> Self {
        Self {
            pool,
            crypto,
            audit,
        }
    }

    pub async fn register(&self, username: &str, password: &str, role: Role) -> VaultResult<Identity> {
        let username = username.trim();
        if username.is_empty() {
            return Err(VaultError::InvalidInput("Username must not be empty".into()));
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(VaultError::InvalidInput(format!(
                "Username must be at most {} characters",
                MAX_USERNAME_CHARS
            )));
        }
        if password.is_empty() {
            return Err(VaultError::InvalidInput("Password must not be empty".into()));
        }

        if self.find(username).await?.is_some() {
            return Err(VaultError::DuplicateUsername(username.to_string()));
        }

        let credential = Credential {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: self.hash_password(password).await?,
            role,
            created_at: chrono::Utc::now().timestamp(),
        };

        let inserted = sqlx::query(
            "INSERT INTO users (id, username, password_hash, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&credential.id)
        .bind(&credential.username)
        .bind(&credential.password_hash)
        .bind(credential.role.as_str())
        .bind(credential.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent registration of the same name.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(VaultError::DuplicateUsername(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!(user_id = %credential.id, role = %role, "Registered user");
        self.audit
            .record(
                &credential.id,
                ActionKind::Register,
                json!({ "username": credential.username }),
            )
            .await;

        Ok(credential.identity())
    }

    pub async fn authenticate(&self, username: &str, password: &str) -> VaultResult<Identity> {
        let credential = self.find(username.trim()).await?;
        // Unknown users pay for one verification too.
        let verified = self
            .verify_password(credential.as_ref().map(|c| c.password_hash.clone()), password)
            .await?;
        let identity = match credential {
            Some(credential) if verified => credential.identity(),
            _ => return Err(VaultError::AuthenticationFailure),
        };

        self.audit
            .record(&identity.user_id, ActionKind::Login, json!({ "username": identity.username }))
            .await;
        Ok(identity)
    }

    pub async fn logout(&self, identity: &Identity) {
        self.audit
            .record(&identity.user_id, ActionKind::Logout, json!({ "username": identity.username }))
            .await;
    }

    async fn hash_password(&self, password: &str) -> VaultResult<String> {
        let crypto = self.crypto.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || crypto.hash_password(&password))
            .await
            .map_err(|e| CryptoError::PasswordHash(e.to_string()))?
            .map_err(VaultError::from)
    }

    /// Verify against `stored_hash`, or against the decoy hash when there
    /// is no such user.
    async fn verify_password(&self, stored_hash: Option<String>, password: &str) -> VaultResult<bool> {
        let crypto = self.crypto.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => crypto.verify_password(&hash, &password),
            None => crypto.verify_dummy(&password),
        })
        .await
        .map_err(|e| VaultError::from(CryptoError::PasswordHash(e.to_string())))
    }

    pub async fn find(&self, username: &str) -> VaultResult<Option<Credential>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let role: String = r.get("role");
            Ok(Credential {
                id: r.get("id"),
                username: r.get("username"),
                password_hash: r.get("password_hash"),
                role: role.parse().map_err(VaultError::Configuration)?,
                created_at: r.get("created_at"),
            })
        })
        .transpose()
    }
}
