use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{Error, UserId, error::TokenError};

use super::{IssuedToken, TokenClaims, TokenConfig, TokenKind, TokenPair};

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Signs and verifies access and refresh tokens.
///
/// Verification pins the algorithm to HS256, requires the configured issuer and allows no clock
/// leeway on `exp`. It does not consult the revocation list.
pub struct TokenIssuer {
    config: TokenConfig,
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            access: KeyPair::from_secret(config.secret(TokenKind::Access)),
            refresh: KeyPair::from_secret(config.secret(TokenKind::Refresh)),
            config,
            validation,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn issue_access_token(&self, user_id: UserId) -> Result<IssuedToken, Error> {
        self.issue(TokenKind::Access, user_id, Utc::now())
    }

    pub fn issue_refresh_token(&self, user_id: UserId) -> Result<IssuedToken, Error> {
        self.issue(TokenKind::Refresh, user_id, Utc::now())
    }

    /// Issue an access token and a refresh token with distinct JTIs
    pub fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, Error> {
        let access = self.issue_access_token(user_id)?;
        let refresh = self.issue_refresh_token(user_id)?;
        Ok(TokenPair::new(access, refresh))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, Error> {
        self.verify(TokenKind::Access, token)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenClaims, Error> {
        self.verify(TokenKind::Refresh, token)
    }

    pub(crate) fn issue(
        &self,
        kind: TokenKind,
        user_id: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, Error> {
        let expires_at = issued_at + self.config.ttl(kind);
        let claims = TokenClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            typ: kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| TokenError::Signing(format!("Failed to encode {kind} token: {e}")))?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    fn verify(&self, kind: TokenKind, token: &str) -> Result<TokenClaims, Error> {
        let data = decode::<TokenClaims>(token, &self.keys(kind).decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(kind = %kind, error = %e, "Token verification failed");
                TokenError::Invalid
            })?;

        if data.claims.typ != kind {
            tracing::debug!(expected = %kind, actual = %data.claims.typ, "Token type mismatch");
            return Err(TokenError::Invalid.into());
        }

        Ok(data.claims)
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::Duration;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(TokenConfig::new_random())
    }

    fn assert_invalid(result: Result<TokenClaims, Error>) {
        assert!(matches!(result, Err(Error::Token(TokenError::Invalid))));
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let issuer = issuer();
        let user_id = UserId::new(42);

        let pair = issuer.issue_pair(user_id).unwrap();
        assert_eq!(pair.token_type, "Bearer");

        let access = issuer.verify_access_token(&pair.access_token).unwrap();
        let refresh = issuer.verify_refresh_token(&pair.refresh_token).unwrap();

        assert_eq!(access.user_id().unwrap(), user_id);
        assert_eq!(refresh.user_id().unwrap(), user_id);
        assert_eq!(access.typ, TokenKind::Access);
        assert_eq!(refresh.typ, TokenKind::Refresh);
        assert_ne!(access.jti, refresh.jti);
        assert_eq!(access.iss, "portcullis");
        assert_eq!(access.exp, pair.access_token_expires_at.timestamp());
        assert!(pair.refresh_token_expires_at > pair.access_token_expires_at);
    }

    #[test]
    fn test_jti_is_unique_per_issuance() {
        let issuer = issuer();
        let first = issuer.issue_access_token(UserId::new(1)).unwrap();
        let second = issuer.issue_access_token(UserId::new(1)).unwrap();
        assert_ne!(first.jti, second.jti);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let issuer = issuer();
        let pair = issuer.issue_pair(UserId::new(1)).unwrap();

        assert_invalid(issuer.verify_access_token(&pair.refresh_token));
        assert_invalid(issuer.verify_refresh_token(&pair.access_token));
    }

    #[test]
    fn test_type_claim_is_checked_even_with_matching_key() {
        let issuer = issuer();
        // A refresh-typed claim set signed with the access key
        let claims = TokenClaims {
            sub: "1".into(),
            jti: "jti".into(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iss: "portcullis".into(),
            typ: TokenKind::Refresh,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &issuer.access.encoding).unwrap();

        assert_invalid(issuer.verify_access_token(&token));
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let issuer = issuer();
        let issued = issuer
            .issue(
                TokenKind::Refresh,
                UserId::new(1),
                Utc::now() - Duration::days(8),
            )
            .unwrap();

        assert_invalid(issuer.verify_refresh_token(&issued.token));
    }

    #[test]
    fn test_foreign_signature_is_invalid() {
        let ours = issuer();
        let theirs = issuer();
        let pair = theirs.issue_pair(UserId::new(1)).unwrap();

        assert_invalid(ours.verify_access_token(&pair.access_token));
    }

    #[test]
    fn test_wrong_issuer_is_invalid() {
        let config = TokenConfig::new_random();
        let verifier = TokenIssuer::new(config.clone());
        let signer = TokenIssuer::new(config.with_issuer("someone-else"));

        let token = signer.issue_access_token(UserId::new(1)).unwrap();
        assert_invalid(verifier.verify_access_token(&token.token));
    }

    #[test]
    fn test_other_algorithms_are_rejected() {
        let issuer = issuer();
        let claims = TokenClaims {
            sub: "1".into(),
            jti: "jti".into(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iss: "portcullis".into(),
            typ: TokenKind::Access,
        };
        let hs512 = encode(&Header::new(Algorithm::HS512), &claims, &issuer.access.encoding).unwrap();
        assert_invalid(issuer.verify_access_token(&hs512));

        // Unsigned token: {"alg":"none","typ":"JWT"}
        let payload = serde_json::to_vec(&claims).unwrap();
        let none = format!(
            "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{}.",
            URL_SAFE_NO_PAD.encode(payload)
        );
        assert_invalid(issuer.verify_access_token(&none));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let issuer = issuer();
        assert_invalid(issuer.verify_access_token(""));
        assert_invalid(issuer.verify_access_token("not.a.jwt"));
    }
}
