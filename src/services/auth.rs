//! Authentication service for user management and JWT handling
//!
//! Provides:
//! - User registration and login
//! - Password hashing with bcrypt
//! - JWT token generation and validation
//! - Refresh token management (hashed at rest, rotated on refresh)

use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::{CreateUser, Database, UpdateUser, UserRecord};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is disabled")]
    AccountDisabled,
    #[error("A user with that email already exists")]
    EmailTaken,
    #[error("A user with that username already exists")]
    UsernameTaken,
    #[error("Invalid token")]
    InvalidToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, AuthError>;

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,
    /// Email
    pub email: String,
    /// Staff flag
    pub staff: bool,
    /// Token type
    pub token_type: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// Claims structure for refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// User ID (subject)
    pub sub: String,
    /// Token type
    pub token_type: String,
    /// Unique token ID (for revocation)
    pub jti: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

// ============================================================================
// Auth Types
// ============================================================================

/// Token pair returned after successful authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Short-lived access token
    pub access_token: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Access token expiration in seconds
    pub expires_in: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

/// Caller identity decoded from a verified access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub is_staff: bool,
}

// ============================================================================
// Configuration
// ============================================================================

/// Auth service configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default: 15 minutes)
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds (default: 7 days)
    pub refresh_token_lifetime: i64,
    /// Bcrypt cost factor
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            access_token_lifetime: 15 * 60,
            refresh_token_lifetime: 7 * 24 * 60 * 60,
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| "change-me-in-production".to_string()),
            access_token_lifetime: std::env::var("ACCESS_TOKEN_LIFETIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15 * 60),
            refresh_token_lifetime: std::env::var("REFRESH_TOKEN_LIFETIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7 * 24 * 60 * 60),
            bcrypt_cost: std::env::var("BCRYPT_COST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_COST),
        }
    }
}

// ============================================================================
// Auth Service
// ============================================================================

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    config: AuthConfig,
}

impl AuthService {
    /// Create a new auth service
    pub fn new(db: Database, config: AuthConfig) -> Self {
        Self { db, config }
    }

    // ========================================================================
    // User Registration
    // ========================================================================

    /// Register a new user. Profile validation (email shape, password length,
    /// age window) happens at the API boundary; this enforces uniqueness and
    /// hashes the password.
    pub async fn register(&self, mut input: CreateUser, password: &str) -> Result<UserRecord> {
        let users = self.db.users();

        if users
            .get_by_email(&input.email)
            .await
            .map_err(AuthError::Internal)?
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }
        if let Some(username) = &input.username
            && users
                .get_by_username(username)
                .await
                .map_err(AuthError::Internal)?
                .is_some()
        {
            return Err(AuthError::UsernameTaken);
        }

        input.password_hash = self.hash_password(password)?;
        users.create(input).await.map_err(AuthError::Internal)
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Login with email or username and password
    pub async fn login(&self, identifier: &str, password: &str) -> Result<(UserRecord, AuthTokens)> {
        let users = self.db.users();

        let user = match users
            .get_by_email(identifier)
            .await
            .map_err(AuthError::Internal)?
        {
            Some(u) => Some(u),
            None => users
                .get_by_username(identifier)
                .await
                .map_err(AuthError::Internal)?,
        };

        let user = user.ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        if !self.verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.generate_tokens(&user).await?;
        Ok((user, tokens))
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    /// Refresh the token pair using a refresh token. The presented token is
    /// rotated: its stored hash is deleted and a fresh pair is issued.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthTokens> {
        let claims = self.decode_refresh_token(refresh_token)?;
        let token_hash = self.hash_token(refresh_token);

        let users = self.db.users();

        let stored_token = users
            .get_refresh_token_by_hash(&token_hash)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidToken)?;

        let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;
        let user = users
            .get_by_id(user_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidToken)?;

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        users
            .update_refresh_token_used(&stored_token.id)
            .await
            .map_err(AuthError::Internal)?;

        let new_tokens = self.generate_tokens(&user).await?;

        users
            .delete_refresh_token(&stored_token.id)
            .await
            .map_err(AuthError::Internal)?;

        Ok(new_tokens)
    }

    /// Validate access token and return the caller identity
    pub fn validate_access_token(&self, token: &str) -> Result<AuthenticatedUser> {
        let claims = self.decode_access_token(token)?;
        let user_id: i64 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthenticatedUser {
            user_id,
            email: claims.email,
            is_staff: claims.staff,
        })
    }

    /// Logout - invalidate refresh token
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let token_hash = self.hash_token(refresh_token);
        let users = self.db.users();

        if let Some(stored_token) = users
            .get_refresh_token_by_hash(&token_hash)
            .await
            .map_err(AuthError::Internal)?
        {
            users
                .delete_refresh_token(&stored_token.id)
                .await
                .map_err(AuthError::Internal)?;
        }

        Ok(())
    }

    // ========================================================================
    // Password Management
    // ========================================================================

    /// Change user password and invalidate all refresh tokens (force re-login)
    pub async fn change_password(&self, user_id: i64, new_password: &str) -> Result<()> {
        let users = self.db.users();
        let new_hash = self.hash_password(new_password)?;

        users
            .update(
                user_id,
                UpdateUser {
                    password_hash: Some(new_hash),
                    ..Default::default()
                },
            )
            .await
            .map_err(AuthError::Internal)?;

        users
            .delete_user_refresh_tokens(user_id)
            .await
            .map_err(AuthError::Internal)?;

        Ok(())
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    /// Hash a password with bcrypt
    fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, self.config.bcrypt_cost)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))
    }

    /// Verify a password against a hash
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        verify(password, hash)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to verify password: {}", e)))
    }

    /// Hash a token for storage (using SHA-256)
    fn hash_token(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Generate access and refresh tokens for a user and persist the refresh
    /// token hash
    async fn generate_tokens(&self, user: &UserRecord) -> Result<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.config.access_token_lifetime);
        let refresh_exp = now + Duration::seconds(self.config.refresh_token_lifetime);
        let jti = Uuid::new_v4().to_string();

        let access_claims = AccessTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            staff: user.is_staff,
            token_type: "access".to_string(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &access_claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to create access token: {}", e)))?;

        let refresh_claims = RefreshTokenClaims {
            sub: user.id.to_string(),
            token_type: "refresh".to_string(),
            jti: jti.clone(),
            exp: refresh_exp.timestamp(),
            iat: now.timestamp(),
        };

        let refresh_token = encode(
            &Header::new(Algorithm::HS256),
            &refresh_claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| {
            AuthError::Internal(anyhow::anyhow!("Failed to create refresh token: {}", e))
        })?;

        let token_hash = self.hash_token(&refresh_token);
        self.db
            .users()
            .create_refresh_token(&jti, user.id, &token_hash, &refresh_exp.to_rfc3339())
            .await
            .map_err(AuthError::Internal)?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            expires_in: self.config.access_token_lifetime,
            token_type: "Bearer".to_string(),
        })
    }

    /// Decode and validate access token
    fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let token_data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;

        if token_data.claims.token_type != "access" {
            return Err(AuthError::InvalidToken);
        }

        Ok(token_data.claims)
    }

    /// Decode and validate refresh token
    fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let token_data = decode::<RefreshTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;

        if token_data.claims.token_type != "refresh" {
            return Err(AuthError::InvalidToken);
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::db::test_pool;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            // Low cost keeps the hashing fast in tests
            bcrypt_cost: 4,
            ..Default::default()
        }
    }

    fn registration(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            username: None,
            password_hash: String::new(),
            first_name: None,
            last_name: None,
            birth_date: None,
            residence_place_id: None,
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let db = test_pool().await;
        let auth = AuthService::new(db.clone(), test_config());

        let user = auth
            .register(registration("login@example.com"), "hunter2-secure")
            .await
            .unwrap();
        assert_ne!(user.password_hash, "hunter2-secure");

        let (logged_in, tokens) = auth
            .login("login@example.com", "hunter2-secure")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(tokens.token_type, "Bearer");

        let identity = auth.validate_access_token(&tokens.access_token).unwrap();
        assert_eq!(identity.user_id, user.id);
        assert!(!identity.is_staff);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let db = test_pool().await;
        let auth = AuthService::new(db.clone(), test_config());

        auth.register(registration("dup@example.com"), "password-one")
            .await
            .unwrap();
        let err = auth
            .register(registration("DUP@example.com"), "password-two")
            .await;
        assert_matches!(err, Err(AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn wrong_password_rejected() {
        let db = test_pool().await;
        let auth = AuthService::new(db.clone(), test_config());

        auth.register(registration("wp@example.com"), "right-password")
            .await
            .unwrap();
        let err = auth.login("wp@example.com", "wrong-password").await;
        assert_matches!(err, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn refresh_rotates_the_token() {
        let db = test_pool().await;
        let auth = AuthService::new(db.clone(), test_config());

        auth.register(registration("rot@example.com"), "some-password")
            .await
            .unwrap();
        let (_, tokens) = auth.login("rot@example.com", "some-password").await.unwrap();

        let new_tokens = auth.refresh_token(&tokens.refresh_token).await.unwrap();
        assert!(auth.validate_access_token(&new_tokens.access_token).is_ok());

        // The old refresh token was revoked by rotation.
        let err = auth.refresh_token(&tokens.refresh_token).await;
        assert_matches!(err, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn logout_revokes_refresh_token() {
        let db = test_pool().await;
        let auth = AuthService::new(db.clone(), test_config());

        auth.register(registration("out@example.com"), "some-password")
            .await
            .unwrap();
        let (_, tokens) = auth.login("out@example.com", "some-password").await.unwrap();

        auth.logout(&tokens.refresh_token).await.unwrap();
        let err = auth.refresh_token(&tokens.refresh_token).await;
        assert_matches!(err, Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn access_token_is_not_a_refresh_token() {
        let db = test_pool().await;
        let auth = AuthService::new(db.clone(), test_config());

        auth.register(registration("mix@example.com"), "some-password")
            .await
            .unwrap();
        let (_, tokens) = auth.login("mix@example.com", "some-password").await.unwrap();

        let err = auth.refresh_token(&tokens.access_token).await;
        assert_matches!(err, Err(AuthError::InvalidToken));
    }
}
