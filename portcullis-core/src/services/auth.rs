//! Login, token refresh, logout and authorization.
//!
//! [`AuthService`] ties the user directory, the abuse guard, the password verifier, the token
//! issuer and the revocation list together.
//!
//! Every failed login surfaces as the same [`AuthError::InvalidCredentials`] regardless of the
//! cause (unknown username, wrong password, locked username, blocked origin), and every attempt
//! runs exactly one password hash comparison. The cause is only written to the log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Error, User, UserId,
    config::AuthConfig,
    crypto::{self, Argon2Verifier, CandidateHash, PasswordVerifier},
    error::{AuthError, TokenError},
    repositories::{CounterStore, UserRepository},
    services::{AbuseGuard, RevocationStore},
    tasks::BackgroundTasks,
    token::{TokenClaims, TokenIssuer, TokenKind, TokenPair},
    validation::{LoginRequest, sanitize_token},
};

/// Result of a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub tokens: TokenPair,
}

pub struct AuthService<U: UserRepository, C: CounterStore> {
    users: Arc<U>,
    guard: Arc<AbuseGuard<C>>,
    revocations: RevocationStore<C>,
    tokens: TokenIssuer,
    verifier: Arc<dyn PasswordVerifier>,
    tasks: Arc<BackgroundTasks>,
    rotate_refresh_tokens: bool,
}

impl<U: UserRepository, C: CounterStore> AuthService<U, C> {
    /// Create the service and start its background workers.
    ///
    /// Must be called from within a tokio runtime. Generation of the dummy hash starts here;
    /// await [`crypto::prepare_dummy_hash`] before serving logins to be sure it has finished.
    pub fn new(users: Arc<U>, counters: Arc<C>, config: AuthConfig) -> Self {
        if !crypto::dummy_hash_ready() {
            tokio::task::spawn_blocking(|| {
                crypto::dummy_hash();
            });
        }

        Self {
            users,
            guard: Arc::new(AbuseGuard::new(Arc::clone(&counters), config.abuse)),
            revocations: RevocationStore::new(counters),
            tokens: TokenIssuer::new(config.tokens),
            verifier: Arc::new(Argon2Verifier),
            tasks: Arc::new(BackgroundTasks::new(config.background)),
            rotate_refresh_tokens: config.rotate_refresh_tokens,
        }
    }

    /// Replace the password verifier
    pub fn with_verifier(mut self, verifier: Arc<dyn PasswordVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn abuse_guard(&self) -> &AbuseGuard<C> {
        &self.guard
    }

    pub fn revocations(&self) -> &RevocationStore<C> {
        &self.revocations
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn background(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Authenticate a username and password presented from `origin`.
    ///
    /// The lock and block checks run before the user lookup, but neither short-circuits: a locked
    /// username is compared against the dummy hash and a blocked origin still runs the full
    /// comparison. Counter bookkeeping is queued on the background pool after the decision.
    pub async fn login(&self, request: LoginRequest, origin: &str) -> Result<LoginResponse, Error> {
        let request = request.sanitize()?;
        let username = request.username.as_str();

        let (locked, block) = tokio::join!(
            self.guard.is_user_locked(username),
            self.guard.origin_block(origin)
        );
        let locked = locked?;
        let block = block?;

        let user = self.users.find_by_username(username).await?;

        let candidate = match &user {
            Some(user) if !locked => CandidateHash::Stored(user.password_hash.clone()),
            _ => CandidateHash::Dummy,
        };

        let password_ok = match self.verifier.verify(&request.password, candidate).await {
            Ok(()) => true,
            Err(Error::Auth(AuthError::InvalidCredentials)) => false,
            Err(e) => {
                tracing::error!(username, origin, error = %e, "Password verification could not run");
                self.submit_failure(username, origin);
                return Err(e);
            }
        };

        match user {
            Some(user) if password_ok && !locked && !block.blocked => {
                self.submit_clear(username, origin);
                let tokens = self.tokens.issue_pair(user.id)?;

                tracing::info!(user_id = %user.id, origin, "User logged in");
                Ok(LoginResponse { user, tokens })
            }
            user => {
                tracing::info!(
                    username,
                    origin,
                    user_found = user.is_some(),
                    user_locked = locked,
                    origin_blocked = block.blocked,
                    retry_after_secs = block.retry_after_seconds(),
                    "Login failed"
                );
                self.submit_failure(username, origin);
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// Fails with [`TokenError::Invalid`] for an invalid, expired or revoked refresh token, and
    /// when the subject no longer exists.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let token = sanitize_token(refresh_token).map_err(|_| TokenError::Invalid)?;
        let claims = self.tokens.verify_refresh_token(token)?;

        if self.revocations.is_blacklisted(&claims.jti).await? {
            tracing::debug!(jti = %claims.jti, "Rejected revoked refresh token");
            return Err(TokenError::Invalid.into());
        }

        let user_id = claims.user_id().map_err(|_| TokenError::Invalid)?;
        let Some(user) = self.users.find_by_id(user_id).await? else {
            tracing::debug!(%user_id, "Refresh token subject no longer exists");
            return Err(TokenError::Invalid.into());
        };

        if self.rotate_refresh_tokens {
            self.revocations
                .blacklist(&claims.jti, claims.remaining_lifetime())
                .await?;
        }

        let tokens = self.tokens.issue_pair(user.id)?;
        tracing::debug!(user_id = %user.id, "Issued refreshed token pair");
        Ok(tokens)
    }

    /// Revoke the caller's access token and, if it belongs to the same user, the refresh token.
    ///
    /// Revocation is best effort: store errors are logged, and an invalid refresh token only
    /// leaves the access token revoked. Claims of anything but an access token fail with
    /// [`TokenError::Invalid`] before anything is revoked. A refresh token issued to a different user fails with
    /// [`TokenError::Mismatch`].
    pub async fn logout(&self, access_claims: &TokenClaims, refresh_token: &str) -> Result<(), Error> {
        if access_claims.typ != TokenKind::Access {
            tracing::warn!(
                user_id = %access_claims.sub,
                kind = %access_claims.typ,
                "Logout with claims of a non-access token"
            );
            return Err(TokenError::Invalid.into());
        }

        self.revoke(access_claims).await;

        let refresh_claims = match sanitize_token(refresh_token)
            .map_err(Error::from)
            .and_then(|token| self.tokens.verify_refresh_token(token))
        {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(
                    user_id = %access_claims.sub,
                    error = %e,
                    "Logout with an invalid refresh token, only the access token was revoked"
                );
                return Ok(());
            }
        };

        if refresh_claims.sub != access_claims.sub {
            tracing::warn!(
                access_sub = %access_claims.sub,
                refresh_sub = %refresh_claims.sub,
                "Logout refresh token belongs to another user"
            );
            return Err(TokenError::Mismatch.into());
        }

        self.revoke(&refresh_claims).await;
        tracing::info!(user_id = %access_claims.sub, "User logged out");
        Ok(())
    }

    /// Verify a bearer access token and reject revoked ones
    pub async fn authenticate(&self, access_token: &str) -> Result<TokenClaims, Error> {
        let token = sanitize_token(access_token).map_err(|_| TokenError::Invalid)?;
        let claims = self.tokens.verify_access_token(token)?;

        if self.revocations.is_blacklisted(&claims.jti).await? {
            tracing::debug!(jti = %claims.jti, "Rejected revoked access token");
            return Err(TokenError::Invalid.into());
        }

        Ok(claims)
    }

    /// Check whether the user holds `permission_code`
    pub async fn authorization_check(
        &self,
        user_id: UserId,
        permission_code: &str,
    ) -> Result<bool, Error> {
        if !user_id.is_valid() {
            return Err(AuthError::PermissionDenied("User id not provided".to_string()).into());
        }

        let access = self
            .users
            .find_access(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let granted = access.grants(permission_code);
        tracing::debug!(%user_id, permission = permission_code, granted, "Authorization check");
        Ok(granted)
    }

    /// Wait for queued bookkeeping to finish and stop the background workers
    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
    }

    async fn revoke(&self, claims: &TokenClaims) {
        if let Err(e) = self
            .revocations
            .blacklist(&claims.jti, claims.remaining_lifetime())
            .await
        {
            tracing::error!(jti = %claims.jti, kind = %claims.typ, error = %e, "Failed to revoke token");
        }
    }

    fn submit_failure(&self, username: &str, origin: &str) {
        let guard = Arc::clone(&self.guard);
        let username = username.to_owned();
        let origin = origin.to_owned();

        self.tasks.submit("record_login_failure", async move {
            guard.record_failure(&username, &origin).await;
        });
    }

    fn submit_clear(&self, username: &str, origin: &str) {
        let guard = Arc::clone(&self.guard);
        let username = username.to_owned();
        let origin = origin.to_owned();

        self.tasks.submit("clear_login_failures", async move {
            if let Err(e) = guard.clear_on_success(&username, &origin).await {
                tracing::warn!(username, origin, error = %e, "Failed to clear login failure counters");
            }
        });
    }
}
