//! Token service
//!
//! Issues and validates HS256-signed JWTs. Tokens are stateless, but every
//! token names the session it belongs to and is only accepted while that
//! session row is still valid. Flipping the session flag therefore revokes
//! the access token and the refresh token together.
//!
//! The signing key is looked up through a [`KeyResolver`] on every sign and
//! verify, so key material can be swapped without rebuilding the service.

use crate::config::AuthConfig;
use crate::db::repositories::SessionRepository;
use crate::models::{Session, UserRole};
use chrono::{Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Supplies the current signing key
pub type KeyResolver = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

const JWT_ALGORITHM: &str = "HS256";

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is malformed")]
    MalformedToken,

    #[error("session is no longer valid")]
    SessionInvalid,

    #[error("session already exists")]
    SessionAlreadyExists,

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("session store error: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Which of the two token kinds a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by both token kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub username: String,
    pub session: Uuid,
    /// Present on access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a validated access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub username: String,
    pub session: Uuid,
    pub role: UserRole,
    pub exp: i64,
}

/// Identity recovered from a validated refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub user_id: Uuid,
    pub username: String,
    pub session: Uuid,
}

/// The user a token is issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

/// Token service
pub struct TokenService {
    sessions: Arc<dyn SessionRepository>,
    key: KeyResolver,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    /// Create a new token service using the TTLs from `config`
    pub fn new(sessions: Arc<dyn SessionRepository>, key: KeyResolver, config: &AuthConfig) -> Self {
        Self {
            sessions,
            key,
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    /// Sign a short-lived access token for `subject` bound to `session`.
    pub fn issue_access_token(&self, subject: &TokenSubject, session: Uuid) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = TokenClaims {
            user_id: subject.user_id,
            username: subject.username.clone(),
            session,
            role: Some(subject.role),
            token_type: TokenType::Access,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Persist a new active session and sign a refresh token for it.
    ///
    /// Fails with `SessionAlreadyExists` while the subject holds another valid
    /// session younger than `reuse_window`. No token is returned if the
    /// session is not stored.
    pub async fn issue_refresh_token(
        &self,
        subject: &TokenSubject,
        session: Uuid,
        reuse_window: Duration,
    ) -> Result<String, AuthError> {
        let record = Session::new(session, subject.user_id);
        let now = record.created_at;
        let stored = self
            .sessions
            .create_unless_active(&record, now - reuse_window)
            .await?;
        if !stored {
            return Err(AuthError::SessionAlreadyExists);
        }

        let claims = TokenClaims {
            user_id: subject.user_id,
            username: subject.username.clone(),
            session,
            role: None,
            token_type: TokenType::Refresh,
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Decode a token and check its signature. Expiry is not checked.
    pub fn parse_claims(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(AuthError::MalformedToken),
            };

        let header: JwtHeader = decode_segment(header_b64)?;
        if header.alg != JWT_ALGORITHM {
            return Err(AuthError::MalformedToken);
        }

        let signature = BASE64URL_NOPAD
            .decode(signature_b64.as_bytes())
            .map_err(|_| AuthError::MalformedToken)?;

        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        decode_segment(payload_b64)
    }

    /// Validate an access token against its expiry and backing session.
    pub async fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims = self.parse_claims(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AuthError::MalformedToken);
        }
        let role = claims.role.ok_or(AuthError::MalformedToken)?;

        self.check_live(&claims).await?;

        Ok(AccessClaims {
            user_id: claims.user_id,
            username: claims.username,
            session: claims.session,
            role,
            exp: claims.exp,
        })
    }

    /// Validate a refresh token against its expiry and backing session.
    pub async fn validate_refresh_token(&self, token: &str) -> Result<RefreshGrant, AuthError> {
        let claims = self.parse_claims(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::MalformedToken);
        }

        self.check_live(&claims).await?;

        Ok(RefreshGrant {
            user_id: claims.user_id,
            username: claims.username,
            session: claims.session,
        })
    }

    async fn check_live(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        if Utc::now().timestamp() > claims.exp {
            return Err(AuthError::Expired);
        }

        match self.sessions.get_by_id(claims.session).await? {
            Some(session) if session.valid && session.user_id == claims.user_id => Ok(()),
            _ => Err(AuthError::SessionInvalid),
        }
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let header = JwtHeader {
            alg: JWT_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| AuthError::Signing(e.to_string()))?;
        let claims_json =
            serde_json::to_vec(claims).map_err(|e| AuthError::Signing(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            BASE64URL_NOPAD.encode(&header_json),
            BASE64URL_NOPAD.encode(&claims_json)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, BASE64URL_NOPAD.encode(&signature)))
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        let key = (self.key)();
        if key.is_empty() {
            return Err(AuthError::Signing("signing key is empty".to_string()));
        }
        HmacSha256::new_from_slice(&key).map_err(|e| AuthError::Signing(e.to_string()))
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = BASE64URL_NOPAD
        .decode(segment.as_bytes())
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    fn static_key(key: &'static [u8]) -> KeyResolver {
        Arc::new(move || key.to_vec())
    }

    fn config_with_ttls(access_secs: i64, refresh_days: i64) -> AuthConfig {
        AuthConfig {
            access_token_ttl_secs: access_secs,
            refresh_token_ttl_days: refresh_days,
            ..AuthConfig::default()
        }
    }

    async fn setup(config: AuthConfig) -> (TokenService, Arc<dyn SessionRepository>, TokenSubject) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user = User::new("tokenuser".to_string(), "hash".to_string(), UserRole::Buyer);
        SqlxUserRepository::new(pool.clone())
            .create(&user)
            .await
            .expect("Failed to create user");

        let sessions = SqlxSessionRepository::boxed(pool);
        let service = TokenService::new(sessions.clone(), static_key(b"test-signing-key"), &config);
        let subject = TokenSubject {
            user_id: user.id,
            username: user.username,
            role: user.role,
        };
        (service, sessions, subject)
    }

    #[tokio::test]
    async fn test_access_token_roundtrip() {
        let (service, _, subject) = setup(AuthConfig::default()).await;
        let session = Uuid::new_v4();
        service
            .issue_refresh_token(&subject, session, Duration::zero())
            .await
            .expect("Failed to issue refresh token");

        let token = service
            .issue_access_token(&subject, session)
            .expect("Failed to issue access token");
        let claims = service
            .validate_access_token(&token)
            .await
            .expect("Token should validate");

        assert_eq!(claims.user_id, subject.user_id);
        assert_eq!(claims.username, "tokenuser");
        assert_eq!(claims.session, session);
        assert_eq!(claims.role, UserRole::Buyer);
    }

    #[tokio::test]
    async fn test_access_token_lifetime() {
        let (service, _, subject) = setup(AuthConfig::default()).await;
        let token = service.issue_access_token(&subject, Uuid::new_v4()).unwrap();

        let claims = service.parse_claims(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[tokio::test]
    async fn test_refresh_token_persists_active_session() {
        let (service, sessions, subject) = setup(AuthConfig::default()).await;
        let session = Uuid::new_v4();

        let token = service
            .issue_refresh_token(&subject, session, Duration::zero())
            .await
            .unwrap();

        let stored = sessions.get_by_id(session).await.unwrap().expect("Session not stored");
        assert!(stored.valid);
        assert_eq!(stored.user_id, subject.user_id);

        let claims = service.parse_claims(&token).unwrap();
        assert_eq!(claims.role, None);
        assert_eq!(claims.exp - claims.iat, 365 * 24 * 3600);

        let grant = service.validate_refresh_token(&token).await.unwrap();
        assert_eq!(grant.session, session);
        assert_eq!(grant.user_id, subject.user_id);
    }

    #[tokio::test]
    async fn test_refresh_token_refused_while_session_active() {
        let (service, sessions, subject) = setup(AuthConfig::default()).await;
        let window = Duration::days(365);
        let first = Uuid::new_v4();
        service
            .issue_refresh_token(&subject, first, window)
            .await
            .expect("First session should open");

        let second = Uuid::new_v4();
        let result = service.issue_refresh_token(&subject, second, window).await;
        assert!(matches!(result, Err(AuthError::SessionAlreadyExists)));
        assert!(sessions.get_by_id(second).await.unwrap().is_none());

        sessions.invalidate(first).await.unwrap();
        service
            .issue_refresh_token(&subject, second, window)
            .await
            .expect("Session should open after logout");
    }

    #[tokio::test]
    async fn test_refresh_token_not_issued_when_store_fails() {
        let (service, _, subject) = setup(AuthConfig::default()).await;
        let ghost = TokenSubject {
            user_id: Uuid::new_v4(),
            ..subject
        };

        let result = service
            .issue_refresh_token(&ghost, Uuid::new_v4(), Duration::zero())
            .await;
        assert!(matches!(result, Err(AuthError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_access_token_rejected_after_logout() {
        let (service, sessions, subject) = setup(AuthConfig::default()).await;
        let session = Uuid::new_v4();
        service
            .issue_refresh_token(&subject, session, Duration::zero())
            .await
            .unwrap();
        let token = service.issue_access_token(&subject, session).unwrap();

        sessions.invalidate(session).await.unwrap();

        let result = service.validate_access_token(&token).await;
        assert!(matches!(result, Err(AuthError::SessionInvalid)));
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_after_logout_all() {
        let (service, sessions, subject) = setup(AuthConfig::default()).await;
        let session = Uuid::new_v4();
        let token = service
            .issue_refresh_token(&subject, session, Duration::zero())
            .await
            .unwrap();

        sessions.invalidate_all_for_user(subject.user_id).await.unwrap();

        let result = service.validate_refresh_token(&token).await;
        assert!(matches!(result, Err(AuthError::SessionInvalid)));
    }

    #[tokio::test]
    async fn test_token_without_session_is_invalid() {
        let (service, _, subject) = setup(AuthConfig::default()).await;
        let token = service.issue_access_token(&subject, Uuid::new_v4()).unwrap();

        let result = service.validate_access_token(&token).await;
        assert!(matches!(result, Err(AuthError::SessionInvalid)));
    }

    #[tokio::test]
    async fn test_expired_access_token() {
        let (service, _, subject) = setup(config_with_ttls(-60, 365)).await;
        let session = Uuid::new_v4();
        service
            .issue_refresh_token(&subject, session, Duration::zero())
            .await
            .unwrap();
        let token = service.issue_access_token(&subject, session).unwrap();

        let result = service.validate_access_token(&token).await;
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let (service, _, subject) = setup(config_with_ttls(3600, -1)).await;
        let token = service
            .issue_refresh_token(&subject, Uuid::new_v4(), Duration::zero())
            .await
            .unwrap();

        let result = service.validate_refresh_token(&token).await;
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn test_token_kinds_are_not_interchangeable() {
        let (service, _, subject) = setup(AuthConfig::default()).await;
        let session = Uuid::new_v4();
        let refresh = service
            .issue_refresh_token(&subject, session, Duration::zero())
            .await
            .unwrap();
        let access = service.issue_access_token(&subject, session).unwrap();

        assert!(matches!(
            service.validate_access_token(&refresh).await,
            Err(AuthError::MalformedToken)
        ));
        assert!(matches!(
            service.validate_refresh_token(&access).await,
            Err(AuthError::MalformedToken)
        ));
    }

    #[tokio::test]
    async fn test_tampered_payload_fails_signature() {
        let (service, _, subject) = setup(AuthConfig::default()).await;
        let token = service.issue_access_token(&subject, Uuid::new_v4()).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let mut claims = service.parse_claims(&token).unwrap();
        claims.role = Some(UserRole::Seller);
        let forged_payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            service.parse_claims(&forged),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_rotated_key_rejects_old_tokens() {
        let (service, sessions, subject) = setup(AuthConfig::default()).await;
        let token = service.issue_access_token(&subject, Uuid::new_v4()).unwrap();

        let rotated = TokenService::new(sessions, static_key(b"another-key"), &AuthConfig::default());
        assert!(matches!(
            rotated.parse_claims(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_malformed_tokens() {
        let (service, _, _) = setup(AuthConfig::default()).await;

        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.##"] {
            assert!(
                matches!(service.parse_claims(token), Err(AuthError::MalformedToken)),
                "{:?} should be malformed",
                token
            );
        }
    }
}
