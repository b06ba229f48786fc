use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::auth::{
    error::AuthError,
    jwt::JwtKeys,
    models::User,
    password,
    store::{CredentialStore, StoreError},
};

/// Freshly minted token pair. Plaintext exists only in this response; the
/// store keeps hashes.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Credential lifecycle engine: registration, login, refresh rotation with
/// replay detection, and logout. Stateless apart from the store; safe to
/// share across requests.
pub struct AuthEngine {
    store: Arc<dyn CredentialStore>,
    keys: JwtKeys,
}

impl AuthEngine {
    pub fn new(store: Arc<dyn CredentialStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    pub async fn register(
        &self,
        email: &str,
        plain_password: &str,
        name: Option<&str>,
    ) -> Result<User, AuthError> {
        let password_hash = password::hash_secret(plain_password)?;
        let user = self
            .store
            .create_user(email, &password_hash, name)
            .await
            .map_err(|e| match e {
                StoreError::Conflict => AuthError::DuplicateEmail,
                other => AuthError::Store(other),
            })?;
        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Unknown email and wrong password fail identically, so the API never
    /// reveals whether an account exists.
    pub async fn login(&self, email: &str, plain_password: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !password::verify_secret(plain_password, &user.password_hash) {
            warn!(user_id = user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = user.id, "user logged in");
        self.issue_token_pair(&user).await
    }

    /// Refresh-token rotation. The presented token is checked against its
    /// signature, its store row, the row's own expiry, and the stored hash
    /// of the exact signed string. Every failure surfaces as the same
    /// `InvalidToken`. Two of the failures are theft signals and burn the
    /// whole token family first: a hit on an already-rotated (revoked) row,
    /// and a signature-valid token whose hash does not match its own row.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let claims = self.keys.verify_refresh(presented).map_err(|e| {
            debug!(error = %e, "refresh token failed verification");
            AuthError::InvalidToken
        })?;

        let Some((record, user)) = self
            .store
            .find_refresh_token_by_uuid(claims.jti)
            .await
            .map_err(AuthError::Store)?
        else {
            return Err(AuthError::InvalidToken);
        };

        // A hit on a rotated-out row is a replayed token.
        if record.revoked {
            return self.burn_family(record.user_id, "revoked row presented").await;
        }

        // A row that never got its hash patched in is as good as absent.
        if record.token_hash.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        // Store-side expiry is checked independently of the signature TTL.
        if record.expires_at <= OffsetDateTime::now_utc() {
            return Err(AuthError::InvalidToken);
        }

        if !password::verify_secret(presented, &record.token_hash) {
            return self.burn_family(record.user_id, "token hash mismatch").await;
        }

        // Rotate: the token just used is dead from here on.
        self.store
            .revoke_refresh_token(record.id)
            .await
            .map_err(AuthError::Store)?;

        self.issue_token_pair(&user).await
    }

    /// Replay/theft response: revoke every refresh token the user has, then
    /// fail. The compensating revoke happens before the error is raised.
    async fn burn_family(&self, user_id: i64, reason: &str) -> Result<TokenPair, AuthError> {
        let revoked = self
            .store
            .revoke_all_refresh_tokens_for_user(user_id)
            .await
            .map_err(AuthError::Store)?;
        warn!(user_id, revoked, reason, "refresh token replay detected, token family revoked");
        Err(AuthError::InvalidToken)
    }

    /// Idempotent: a user with no active tokens logs out successfully.
    pub async fn logout(&self, user_id: i64) -> Result<(), AuthError> {
        let revoked = self
            .store
            .revoke_all_refresh_tokens_for_user(user_id)
            .await
            .map_err(AuthError::Store)?;
        info!(user_id, revoked, "user logged out");
        Ok(())
    }

    /// Two-step by necessity: the refresh token embeds the row's `uuid` as
    /// `jti`, which only exists once the row does, and the stored hash must
    /// cover the final signed string. Do not collapse into a single insert.
    async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let expires_at = OffsetDateTime::now_utc() + self.keys.refresh_ttl;
        let record = self
            .store
            .create_refresh_token(user.id, expires_at)
            .await
            .map_err(AuthError::Store)?;

        let refresh_token = self.keys.sign_refresh(user.id, record.uuid)?;
        let token_hash = password::hash_secret(&refresh_token)?;
        self.store
            .update_refresh_token_hash(record.id, &token_hash)
            .await
            .map_err(AuthError::Store)?;

        let access_token = self.keys.sign_access(user)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::RefreshToken;
    use crate::config::JwtConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Inner {
        users: Vec<User>,
        tokens: Vec<RefreshToken>,
    }

    /// In-memory store double mirroring the Postgres semantics the engine
    /// relies on: unique emails, per-row updates, atomic bulk revoke.
    #[derive(Default)]
    struct MemoryStore {
        inner: Mutex<Inner>,
    }

    impl MemoryStore {
        /// Backdates every refresh-token row, simulating a row that outlived
        /// its store-side TTL while its signature is still valid.
        fn expire_all_rows(&self) {
            let mut inner = self.inner.lock().unwrap();
            let past = OffsetDateTime::now_utc() - time::Duration::hours(1);
            for t in &mut inner.tokens {
                t.expires_at = past;
            }
        }

        fn active_token_count(&self, user_id: i64) -> usize {
            let inner = self.inner.lock().unwrap();
            inner
                .tokens
                .iter()
                .filter(|t| t.user_id == user_id && !t.revoked)
                .count()
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn create_user(
            &self,
            email: &str,
            password_hash: &str,
            name: Option<&str>,
        ) -> Result<User, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.users.iter().any(|u| u.email == email) {
                return Err(StoreError::Conflict);
            }
            let now = OffsetDateTime::now_utc();
            let user = User {
                id: inner.users.len() as i64 + 1,
                uuid: Uuid::new_v4(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                name: name.map(str::to_string),
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            inner.users.push(user.clone());
            Ok(user)
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.users.iter().find(|u| u.email == email).cloned())
        }

        async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.users.iter().find(|u| u.id == id).cloned())
        }

        async fn create_refresh_token(
            &self,
            user_id: i64,
            expires_at: OffsetDateTime,
        ) -> Result<RefreshToken, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            let now = OffsetDateTime::now_utc();
            let row = RefreshToken {
                id: inner.tokens.len() as i64 + 1,
                uuid: Uuid::new_v4(),
                user_id,
                token_hash: String::new(),
                expires_at,
                revoked: false,
                created_at: now,
                updated_at: now,
            };
            inner.tokens.push(row.clone());
            Ok(row)
        }

        async fn find_refresh_token_by_uuid(
            &self,
            jti: Uuid,
        ) -> Result<Option<(RefreshToken, User)>, StoreError> {
            let inner = self.inner.lock().unwrap();
            let Some(row) = inner.tokens.iter().find(|t| t.uuid == jti).cloned() else {
                return Ok(None);
            };
            let Some(user) = inner.users.iter().find(|u| u.id == row.user_id).cloned() else {
                return Ok(None);
            };
            Ok(Some((row, user)))
        }

        async fn update_refresh_token_hash(&self, id: i64, hash: &str) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(t) = inner.tokens.iter_mut().find(|t| t.id == id) {
                t.token_hash = hash.to_string();
                t.updated_at = OffsetDateTime::now_utc();
            }
            Ok(())
        }

        async fn revoke_refresh_token(&self, id: i64) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(t) = inner.tokens.iter_mut().find(|t| t.id == id) {
                t.revoked = true;
                t.updated_at = OffsetDateTime::now_utc();
            }
            Ok(())
        }

        async fn revoke_all_refresh_tokens_for_user(
            &self,
            user_id: i64,
        ) -> Result<u64, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            let mut count = 0;
            for t in inner.tokens.iter_mut().filter(|t| t.user_id == user_id) {
                if !t.revoked {
                    count += 1;
                }
                t.revoked = true;
                t.updated_at = OffsetDateTime::now_utc();
            }
            Ok(count)
        }
    }

    fn make_engine() -> (AuthEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let keys = JwtKeys::from_config(&JwtConfig {
            access_secret: "engine-access-secret".into(),
            refresh_secret: "engine-refresh-secret".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
        });
        (AuthEngine::new(store.clone(), keys), store)
    }

    async fn registered_login(engine: &AuthEngine) -> TokenPair {
        engine
            .register("a@x.com", "pw12345", Some("A"))
            .await
            .expect("register");
        engine.login("a@x.com", "pw12345").await.expect("login")
    }

    #[tokio::test]
    async fn register_then_login_succeeds() {
        let (engine, _) = make_engine();
        let user = engine
            .register("a@x.com", "pw12345", Some("A"))
            .await
            .expect("register");
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.name.as_deref(), Some("A"));

        let pair = engine.login("a@x.com", "pw12345").await.expect("login");
        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let (engine, _) = make_engine();
        engine
            .register("a@x.com", "pw12345", None)
            .await
            .expect("first register");
        let err = engine.register("a@x.com", "other-pw", None).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_fail_identically() {
        let (engine, _) = make_engine();
        engine
            .register("a@x.com", "pw12345", None)
            .await
            .expect("register");

        let wrong_pw = engine.login("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(wrong_pw, AuthError::InvalidCredentials));

        let unknown = engine.login("nobody@x.com", "pw12345").await.unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn issued_access_token_carries_user_identity() {
        let (engine, store) = make_engine();
        let pair = registered_login(&engine).await;
        let user = store
            .find_user_by_email("a@x.com")
            .await
            .unwrap()
            .expect("user exists");
        let claims = engine.keys.verify_access(&pair.access_token).expect("verify");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.uuid, user.uuid);
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn refresh_rotates_the_token() {
        let (engine, store) = make_engine();
        let pair0 = registered_login(&engine).await;

        let pair1 = engine.refresh(&pair0.refresh_token).await.expect("refresh");
        assert_ne!(pair1.refresh_token, pair0.refresh_token);

        // One active row remains: the rotated-out token is dead.
        assert_eq!(store.active_token_count(1), 1);
        let pair2 = engine.refresh(&pair1.refresh_token).await.expect("second refresh");
        assert_ne!(pair2.refresh_token, pair1.refresh_token);
    }

    #[tokio::test]
    async fn replayed_token_burns_the_whole_family() {
        let (engine, store) = make_engine();
        let pair0 = registered_login(&engine).await;
        let pair1 = engine.refresh(&pair0.refresh_token).await.expect("refresh");

        // Replaying the rotated-out token fails and revokes everything.
        let err = engine.refresh(&pair0.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        assert_eq!(store.active_token_count(1), 0);

        // The still-fresh token from the legitimate rotation is dead too.
        let err = engine.refresh(&pair1.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn logout_kills_every_prior_refresh_token() {
        let (engine, _) = make_engine();
        let pair0 = registered_login(&engine).await;
        let pair1 = engine.login("a@x.com", "pw12345").await.expect("second login");

        engine.logout(1).await.expect("logout");

        for token in [&pair0.refresh_token, &pair1.refresh_token] {
            let err = engine.refresh(token).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidToken));
        }

        // Idempotent with nothing left to revoke.
        engine.logout(1).await.expect("logout again");
    }

    #[tokio::test]
    async fn expired_store_row_rejects_refresh_despite_valid_signature() {
        let (engine, store) = make_engine();
        let pair = registered_login(&engine).await;

        store.expire_all_rows();

        // Signature TTL (7 days) has not elapsed, but the row has.
        let err = engine.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn malformed_and_foreign_tokens_are_invalid() {
        let (engine, _) = make_engine();
        registered_login(&engine).await;

        let err = engine.refresh("garbage").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        // Signed with a different secret pair entirely.
        let foreign_keys = JwtKeys::from_config(&JwtConfig {
            access_secret: "other-access".into(),
            refresh_secret: "other-refresh".into(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 7,
        });
        let foreign = foreign_keys.sign_refresh(1, Uuid::new_v4()).expect("sign");
        let err = engine.refresh(&foreign).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn signature_valid_token_with_no_matching_row_is_invalid() {
        let (engine, _) = make_engine();
        registered_login(&engine).await;

        // Correct secret, but the jti points at no row.
        let orphan = engine.keys.sign_refresh(1, Uuid::new_v4()).expect("sign");
        let err = engine.refresh(&orphan).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
