//! # Authorization
//!
//! Resolves the `Authorization` header of a request into a [`Principal`].
//!
//! - `none`: every request is accepted as [`Principal::Anonymous`]; must be configured explicitly
//! - `basic`: `base64(client_id:client_secret)` validated as a client secret
//! - `bearer`: an HS256 JSON web token whose audience lists the readable repositories

use crate::error::{ConfigServerError, Result};
use crate::jwt::JsonWebToken;
use crate::key::Keystore;
use crate::repository::RepositoryManager;
use crate::secret::{validate_client_secret, ExpiryPolicy};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ANONYMOUS_CLIENT_ID: &str = "anonymous";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationKind {
    None,
    Basic,
    Bearer,
}

impl FromStr for AuthorizationKind {
    type Err = ConfigServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "bearer" => Ok(Self::Bearer),
            other => Err(ConfigServerError::Unauthorized(format!(
                "'{other}' unsupported authorization method"
            ))),
        }
    }
}

impl fmt::Display for AuthorizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Bearer => "bearer",
        })
    }
}

/// Identity behind a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Basic { client_id: String },
    Bearer(JsonWebToken),
}

impl Principal {
    pub fn client_id(&self) -> &str {
        match self {
            Principal::Anonymous => ANONYMOUS_CLIENT_ID,
            Principal::Basic { client_id } => client_id,
            Principal::Bearer(jwt) => jwt.client_id(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    /// Bearer tokens need the repository in their audience *and* a matching entitlement
    pub fn is_allowed_repository(&self, manager: &RepositoryManager, repository: &str) -> bool {
        match self {
            Principal::Anonymous => true,
            Principal::Basic { client_id } => manager.is_client_allowed(repository, client_id),
            Principal::Bearer(jwt) => {
                jwt.has_audience(repository) && manager.is_client_allowed(repository, jwt.client_id())
            }
        }
    }
}

/// Everything needed to check credentials
#[derive(Clone, Copy)]
pub struct Authorizer<'a> {
    pub allowed: &'a [AuthorizationKind],
    pub keystore: &'a Keystore,
    pub expiry: ExpiryPolicy,
}

impl<'a> Authorizer<'a> {
    pub fn new(allowed: &'a [AuthorizationKind], keystore: &'a Keystore, expiry: ExpiryPolicy) -> Self {
        Self {
            allowed,
            keystore,
            expiry,
        }
    }

    /// Resolve an `Authorization` header value
    pub fn authorize(&self, header: Option<&str>) -> Result<Principal> {
        if self.allowed.contains(&AuthorizationKind::None) {
            return Ok(Principal::Anonymous);
        }

        let header = header
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigServerError::Unauthorized("missing authorization header".into()))?;

        let mut parts = header.split_whitespace();
        let (Some(scheme), Some(credentials), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigServerError::Unauthorized(
                "invalid authorization header".into(),
            ));
        };

        let kind: AuthorizationKind = scheme.parse()?;
        if !self.allowed.contains(&kind) {
            return Err(ConfigServerError::Unauthorized(format!(
                "'{kind}' unsupported authorization method"
            )));
        }

        match kind {
            AuthorizationKind::Basic => self.basic(credentials),
            AuthorizationKind::Bearer => self.bearer(credentials),
            AuthorizationKind::None => Ok(Principal::Anonymous),
        }
    }

    fn basic(&self, credentials: &str) -> Result<Principal> {
        let (client_id, secret) = decode_basic(credentials)?;

        if !validate_client_secret(&client_id, &secret, self.keystore.aes_key(), self.expiry) {
            return Err(ConfigServerError::Unauthorized(format!(
                "invalid credentials for client '{client_id}'"
            )));
        }
        Ok(Principal::Basic { client_id })
    }

    fn bearer(&self, credentials: &str) -> Result<Principal> {
        let jwt = JsonWebToken::parse(credentials, self.keystore.hmac_secret())?;
        Ok(Principal::Bearer(jwt))
    }
}

/// Split `base64(user:password)` into its two halves
pub fn decode_basic(credentials: &str) -> Result<(String, String)> {
    let invalid = || ConfigServerError::Unauthorized("invalid authorization header".into());

    let decoded = STANDARD.decode(credentials).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (user, password) = decoded.split_once(':').ok_or_else(invalid)?;
    if user.is_empty() || password.contains(':') {
        return Err(invalid());
    }
    Ok((user.to_string(), password.to_string()))
}

/// Build a `Basic` header value
pub fn basic_header(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{secret}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::generate_client_secret;
    use chrono::Duration;

    const BOTH: &[AuthorizationKind] = &[AuthorizationKind::Basic, AuthorizationKind::Bearer];

    fn authorizer<'a>(allowed: &'a [AuthorizationKind], keystore: &'a Keystore) -> Authorizer<'a> {
        Authorizer::new(allowed, keystore, ExpiryPolicy::warn_only())
    }

    #[test]
    fn test_none_accepts_everything() {
        let keystore = Keystore::generate();
        let allowed = [AuthorizationKind::None, AuthorizationKind::Basic];
        let auth = authorizer(&allowed, &keystore);

        assert_eq!(auth.authorize(None).unwrap(), Principal::Anonymous);
        assert_eq!(auth.authorize(Some("Basic garbage")).unwrap(), Principal::Anonymous);
        assert_eq!(Principal::Anonymous.client_id(), ANONYMOUS_CLIENT_ID);
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let keystore = Keystore::generate();
        let auth = authorizer(BOTH, &keystore);

        assert!(auth.authorize(None).is_err());
        assert!(auth.authorize(Some("")).is_err());
        assert!(auth.authorize(Some("Basic")).is_err());
        assert!(auth.authorize(Some("Basic a b")).is_err());
        assert!(auth.authorize(Some("Digest abc")).is_err());
    }

    #[test]
    fn test_basic_roundtrip() {
        let keystore = Keystore::generate();
        let secret = generate_client_secret("client-a", keystore.aes_key()).unwrap();
        let auth = authorizer(BOTH, &keystore);

        let principal = auth
            .authorize(Some(&basic_header("client-a", &secret)))
            .unwrap();
        assert_eq!(principal.client_id(), "client-a");

        let lowercase = basic_header("client-a", &secret).replacen("Basic", "basic", 1);
        assert!(auth.authorize(Some(&lowercase)).is_ok());
    }

    #[test]
    fn test_basic_wrong_client() {
        let keystore = Keystore::generate();
        let secret = generate_client_secret("client-a", keystore.aes_key()).unwrap();
        let auth = authorizer(BOTH, &keystore);

        let result = auth.authorize(Some(&basic_header("client-b", &secret)));
        assert!(matches!(result, Err(ConfigServerError::Unauthorized(_))));
    }

    #[test]
    fn test_scheme_not_in_allow_list() {
        let keystore = Keystore::generate();
        let secret = generate_client_secret("client-a", keystore.aes_key()).unwrap();
        let allowed = [AuthorizationKind::Bearer];
        let auth = authorizer(&allowed, &keystore);

        assert!(auth.authorize(Some(&basic_header("client-a", &secret))).is_err());
    }

    #[test]
    fn test_bearer_roundtrip() {
        let keystore = Keystore::generate();
        let jwt =
            JsonWebToken::new("test", "client-a", vec!["repo".into()], Duration::hours(1)).unwrap();
        let packed = jwt.pack(keystore.hmac_secret()).unwrap();
        let auth = authorizer(BOTH, &keystore);

        let principal = auth.authorize(Some(&format!("Bearer {packed}"))).unwrap();
        assert_eq!(principal, Principal::Bearer(jwt));
    }

    #[test]
    fn test_bearer_signed_with_other_secret() {
        let keystore = Keystore::generate();
        let jwt = JsonWebToken::new("test", "client-a", vec![], Duration::hours(1)).unwrap();
        let packed = jwt.pack(Keystore::generate().hmac_secret()).unwrap();
        let auth = authorizer(BOTH, &keystore);

        assert!(auth.authorize(Some(&format!("Bearer {packed}"))).is_err());
    }

    #[test]
    fn test_decode_basic() {
        let encoded = STANDARD.encode("id:secret");
        assert_eq!(
            decode_basic(&encoded).unwrap(),
            ("id".to_string(), "secret".to_string())
        );
        assert!(decode_basic(&STANDARD.encode("nocolon")).is_err());
        assert!(decode_basic(&STANDARD.encode("a:b:c")).is_err());
        assert!(decode_basic("!!!").is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("BEARER".parse::<AuthorizationKind>().unwrap(), AuthorizationKind::Bearer);
        assert!("digest".parse::<AuthorizationKind>().is_err());
    }
}
