//! Manage json web tokens.
//!
//! A directory login ends with a short-lived signed assertion: the local
//! account never has a usable password, so this token is the session.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::user::Account;

const DEFAULT_AUDIENCE: &str = "ldap-bridge";
pub const EXPIRATION_TIME: u64 = 60 * 5; // 5 minutes.
pub const TOKEN_TYPE: &str = "Bearer";
const AUTHENTICATION_METHOD: &str = "ldap";

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Local user ID.
    pub sub: String,
    pub email: String,
    /// How the user proved their identity.
    pub amr: Vec<String>,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    private_key: EncodingKey,
    name: String,
    audience: String,
    expires_in: u64,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("algorithm", &self.algorithm)
            .field("name", &self.name)
            .field("audience", &self.audience)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance from an EC P-384 PEM key.
    ///
    /// Verifiers hold the matching public key; the bridge only signs.
    pub fn new(name: &str, private_key_pem: &str) -> Result<Self> {
        let private_key =
            EncodingKey::from_ec_pem(private_key_pem.as_bytes())?;

        Ok(Self {
            algorithm: Algorithm::ES384,
            private_key,
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_string(),
            expires_in: EXPIRATION_TIME,
        })
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Set token lifetime, in seconds.
    pub fn expires_in(&mut self, seconds: u64) {
        self.expires_in = seconds;
    }

    pub fn lifetime(&self) -> u64 {
        self.expires_in
    }

    /// Sign a session for a directory-verified `account`.
    pub fn create(&self, account: &Account) -> Result<String> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ServerError::Internal {
                details: err.to_string(),
            })?
            .as_secs();
        let header = Header::new(self.algorithm);
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + self.expires_in,
            iat: time,
            iss: self.name.clone(),
            sub: account.id.to_string(),
            email: account.email.clone(),
            amr: vec![AUTHENTICATION_METHOD.to_owned()],
        };

        Ok(encode(&header, &claims, &self.private_key)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    use super::*;
    use crate::identity::NormalizedIdentity;

    pub const PRIVATE_KEY: &str = include_str!("../fixtures/es384-private.pem");
    pub const PUBLIC_KEY: &str = include_str!("../fixtures/es384-public.pem");

    pub fn manager() -> TokenManager {
        TokenManager::new("https://crm.example.com/", PRIVATE_KEY).unwrap()
    }

    /// Verify `token` the way a consumer of the session would.
    pub fn verify(token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let key = DecodingKey::from_ec_pem(PUBLIC_KEY.as_bytes())?;
        let mut validation = Validation::new(Algorithm::ES384);
        validation.set_audience(&[DEFAULT_AUDIENCE]);
        validation.set_issuer(&["https://crm.example.com/"]);
        Ok(decode::<Claims>(token, &key, &validation)?.claims)
    }

    #[test]
    fn test_create_and_decode() {
        let tokens = manager();
        let account = Account::new(
            &NormalizedIdentity {
                first_name: "Alice".into(),
                last_name: String::new(),
                email: "alice@co.com".into(),
            },
            String::new(),
            false,
            Utc::now(),
        );

        let token = tokens.create(&account).unwrap();
        let claims = verify(&token).unwrap();

        assert_eq!(claims.sub, account.id.to_string());
        assert_eq!(claims.email, "alice@co.com");
        assert_eq!(claims.iss, "https://crm.example.com/");
        assert_eq!(claims.aud, DEFAULT_AUDIENCE);
        assert_eq!(claims.amr, vec!["ldap".to_owned()]);
        assert_eq!(claims.exp - claims.iat, EXPIRATION_TIME);
    }

    #[test]
    fn test_reject_foreign_audience() {
        let mut other = manager();
        other.audience("someone-else");

        let account = Account::new(&NormalizedIdentity::default(), String::new(), false, Utc::now());
        let token = other.create(&account).unwrap();

        assert!(verify(&token).is_err());
    }

    #[test]
    fn test_invalid_key() {
        assert!(TokenManager::new("x", "not a pem").is_err());
    }
}
