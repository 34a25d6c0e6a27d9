//! Bearer token issuance and verification. Tokens are HMAC-SHA256 JWTs
//! with `sub`, `tier`, `iat` and `exp` claims.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use esg_core::{EsgError, EsgResult, Principal, Tier, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub tier: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn issue(&self, user_id: &UserId, tier: Tier) -> EsgResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.0.clone(),
            tier: tier.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| EsgError::Internal {
            message: format!("token signing failed: {}", e),
        })
    }

    pub fn verify(&self, token: &str) -> EsgResult<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(
            |e| EsgError::TokenInvalid {
                reason: e.to_string(),
            },
        )?;
        let tier = Tier::parse(&data.claims.tier).map_err(|_| EsgError::TokenInvalid {
            reason: format!("unknown tier claim: {}", data.claims.tier),
        })?;
        Ok(Principal {
            user_id: UserId(data.claims.sub),
            tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new("unit-test-secret-0123456789", 60)
    }

    #[test]
    fn issued_tokens_verify_back_to_the_principal() {
        let authority = authority();
        let user = UserId::from_email("token@example.com");
        let token = authority.issue(&user, Tier::Starter).unwrap();
        let principal = authority.verify(&token).unwrap();
        assert_eq!(principal.user_id, user);
        assert_eq!(principal.tier, Tier::Starter);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let authority = authority();
        let token = authority
            .issue(&UserId::from_email("token@example.com"), Tier::Free)
            .unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        assert!(authority.verify(&tampered).is_err());

        let other = TokenAuthority::new("a-completely-different-secret", 60);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let authority = TokenAuthority::new("unit-test-secret-0123456789", -120);
        let token = authority
            .issue(&UserId::from_email("expired@example.com"), Tier::Free)
            .unwrap();
        let err = authority.verify(&token).unwrap_err();
        assert_eq!(err.error_kind(), "token_invalid");
    }
}
