//! Principals, roles and bearer-token authenticators.
//!
//! Authentication only produces a [`Principal`]; the decision whether a
//! principal may call a route lives in [`crate::api::guard`].

use crate::config::AuthConfig;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_USER")]
    User,
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
    /// Any role name this service does not act on.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("ROLE_USER"),
            Role::Admin => f.write_str("ROLE_ADMIN"),
            Role::Unknown => f.write_str("ROLE_UNKNOWN"),
        }
    }
}

/// Caller identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub roles: HashSet<Role>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Principal {
            subject: "anonymous".to_string(),
            roles: HashSet::new(),
        }
    }

    /// `ROLE_ADMIN` implies `ROLE_USER`.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role) || (role == Role::User && self.roles.contains(&Role::Admin))
    }
}

/// JWT payload accepted by [`JwtAuthenticator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Resolves a bearer token to a principal; `None` means the token is invalid.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Principal>;
}

pub type AuthenticatorArc = Arc<dyn Authenticator>;

/// Build the authenticator selected by `auth.kind`.
pub fn authenticator_from_config(config: &AuthConfig) -> AuthenticatorArc {
    match config {
        AuthConfig::Memory { tokens } => Arc::new(MemoryAuthenticator::new(tokens.clone())),
        AuthConfig::Jwt {
            secret,
            validate_expiration,
        } => {
            if validate_expiration.unwrap_or(true) {
                Arc::new(JwtAuthenticator::new(secret))
            } else {
                Arc::new(JwtAuthenticator::new_no_validation(secret))
            }
        }
    }
}

/// Static token table, for development and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuthenticator {
    tokens: HashMap<String, Vec<Role>>,
}

impl MemoryAuthenticator {
    /// Create an authenticator over a token to roles table.
    pub fn new(tokens: HashMap<String, Vec<Role>>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, roles: Vec<Role>) -> Self {
        self.tokens.insert(token.into(), roles);
        self
    }
}

impl Authenticator for MemoryAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).map(|roles| Principal {
            subject: format!("token:{}", token.chars().take(4).collect::<String>()),
            roles: roles.iter().copied().collect(),
        })
    }
}

/// HS256 JWT authenticator.
#[derive(Clone)]
pub struct JwtAuthenticator {
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuthenticator").finish()
    }
}

impl JwtAuthenticator {
    /// Tokens must carry a valid `exp` claim.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self::with_validation(secret, validation)
    }

    /// Signature is checked, expiration is not.
    pub fn new_no_validation(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self::with_validation(secret, validation)
    }

    fn with_validation(secret: &str, validation: Validation) -> Self {
        Self {
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_ref())),
            validation: Arc::new(validation),
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        match jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(Principal {
                subject: data.claims.sub,
                roles: data.claims.roles.into_iter().collect(),
            }),
            Err(err) => {
                debug!("Rejected bearer token: {}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    fn encode(claims: &Claims, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .expect("Failed to encode token")
    }

    #[test]
    fn test_admin_implies_user() {
        let principal = Principal {
            subject: "admin".to_string(),
            roles: [Role::Admin].into_iter().collect(),
        };
        assert!(principal.has_role(Role::Admin));
        assert!(principal.has_role(Role::User));
        assert!(!Principal::anonymous().has_role(Role::User));
    }

    #[test]
    fn test_role_names_round_trip_through_serde() {
        let roles: Vec<Role> =
            serde_json::from_str(r#"["ROLE_ADMIN", "ROLE_USER", "ROLE_EDITOR"]"#)
                .expect("Failed to parse roles");
        assert_eq!(roles, vec![Role::Admin, Role::User, Role::Unknown]);
        assert_eq!(Role::Admin.to_string(), "ROLE_ADMIN");
    }

    #[test]
    fn test_memory_authenticator() {
        let authenticator =
            MemoryAuthenticator::default().with_token("admin-token", vec![Role::Admin]);

        let principal = authenticator
            .authenticate("admin-token")
            .expect("Token should resolve");
        assert!(principal.has_role(Role::Admin));
        assert!(authenticator.authenticate("other").is_none());
    }

    #[test]
    fn test_jwt_authenticator() {
        let secret = "test_secret_key";
        let token = encode(
            &Claims {
                sub: "users/1".to_string(),
                roles: vec![Role::Admin],
                exp: None,
            },
            secret,
        );

        let principal = JwtAuthenticator::new_no_validation(secret)
            .authenticate(&token)
            .expect("Failed to authenticate token");
        assert_eq!(principal.subject, "users/1");
        assert!(principal.has_role(Role::Admin));
    }

    #[test]
    fn test_jwt_authenticator_invalid_secret() {
        let token = encode(
            &Claims {
                sub: "users/1".to_string(),
                roles: vec![Role::Admin],
                exp: None,
            },
            "test_secret_key",
        );

        assert!(JwtAuthenticator::new_no_validation("wrong_secret_key")
            .authenticate(&token)
            .is_none());
    }

    #[test]
    fn test_jwt_authenticator_requires_exp_when_validating() {
        let secret = "test_secret_key";
        let token = encode(
            &Claims {
                sub: "users/1".to_string(),
                roles: vec![Role::Admin],
                exp: None,
            },
            secret,
        );

        assert!(JwtAuthenticator::new(secret).authenticate(&token).is_none());
    }
}
