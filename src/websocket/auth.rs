//! Auth handshake token verification (§3 "AuthToken", §4.3 "Auth handshake")
//!
//! The token itself is minted by an external REST route outside this
//! crate's scope (§1 Non-goals); this module only verifies the signature
//! and expiry of a token presented on the `auth` wire frame.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::ParticipantId;
use crate::room::types::Avatar;

/// Claims carried by a handshake token: subject id, display name, and body
/// color, all of which become the participant's identity for the life of
/// the socket (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: String,
    pub name: String,
    #[serde(rename = "bodyColor")]
    pub body_color: String,
    pub exp: i64,
}

/// The identity recovered from a verified token.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub id: ParticipantId,
    pub name: String,
    pub avatar: Avatar,
}

/// Verifies handshake tokens against the process-wide shared secret
/// (§5 "Shared secret for token verification — read-only, process-wide").
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verifies signature and expiry (synchronous, non-blocking per §5) and
    /// resolves the subject into a typed [`ParticipantId`].
    pub fn verify(&self, token: &str) -> Result<AuthIdentity> {
        let data = jsonwebtoken::decode::<AuthClaims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;
        let id = ParticipantId::from_str(&claims.sub)
            .map_err(|e| Error::AuthFailed(format!("invalid subject id: {e}")))?;

        Ok(AuthIdentity {
            id,
            name: claims.name,
            avatar: Avatar {
                body_color: claims.body_color,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(secret: &str, claims: &AuthClaims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn verifies_a_well_formed_token() {
        let id = ParticipantId::new();
        let claims = AuthClaims {
            sub: id.to_string(),
            name: "Alice".into(),
            body_color: "#3B82F6".into(),
            exp: (chrono::Utc::now() + chrono::Duration::minutes(5)).timestamp(),
        };
        let token = sign("shared-secret", &claims);

        let verifier = TokenVerifier::new("shared-secret");
        let identity = verifier.verify(&token).unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.name, "Alice");
    }

    #[test]
    fn rejects_a_token_signed_with_the_wrong_secret() {
        let claims = AuthClaims {
            sub: ParticipantId::new().to_string(),
            name: "Alice".into(),
            body_color: "#3B82F6".into(),
            exp: (chrono::Utc::now() + chrono::Duration::minutes(5)).timestamp(),
        };
        let token = sign("attacker-secret", &claims);

        let verifier = TokenVerifier::new("shared-secret");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let claims = AuthClaims {
            sub: ParticipantId::new().to_string(),
            name: "Alice".into(),
            body_color: "#3B82F6".into(),
            exp: (chrono::Utc::now() - chrono::Duration::minutes(1)).timestamp(),
        };
        let token = sign("shared-secret", &claims);

        let verifier = TokenVerifier::new("shared-secret");
        assert!(verifier.verify(&token).is_err());
    }
}
