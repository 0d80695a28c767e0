//! Minimal HS256 JSON web tokens (RFC 7519).
//!
//! Only what the server issues is supported: an `HS256` header, the registered
//! `iss`/`sub`/`aud`/`nbf`/`iat`/`exp` claims, and an HMAC-SHA-256 signature over
//! `base64url(header).base64url(payload)`.

use crate::crypto::HmacSecret;
use crate::error::{ConfigServerError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const ALGORITHM: &str = "HS256";
pub const TOKEN_TYPE: &str = "JWT";
pub const DEFAULT_VALIDITY_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

impl Default for JwtHeader {
    fn default() -> Self {
        Self {
            alg: ALGORITHM.into(),
            typ: TOKEN_TYPE.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtPayload {
    #[serde(default)]
    pub iss: String,
    pub sub: String,
    #[serde(default)]
    pub aud: Vec<String>,
    pub nbf: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonWebToken {
    pub header: JwtHeader,
    pub payload: JwtPayload,
}

impl JsonWebToken {
    /// Build a token valid from now for `validity`
    pub fn new(
        issuer: &str,
        subject: &str,
        audience: Vec<String>,
        validity: Duration,
    ) -> Result<Self> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(validity)
            .ok_or_else(|| ConfigServerError::InvalidJwt("validity period is too long".into()))?;
        Ok(Self {
            header: JwtHeader::default(),
            payload: JwtPayload {
                iss: issuer.to_string(),
                sub: subject.to_string(),
                aud: audience,
                nbf: now.timestamp(),
                iat: now.timestamp(),
                exp: expires.timestamp(),
            },
        })
    }

    pub fn client_id(&self) -> &str {
        &self.payload.sub
    }

    /// Seconds between issue and expiry
    pub fn expires_in(&self) -> i64 {
        self.payload.exp - self.payload.iat
    }

    /// Case-insensitive audience membership
    pub fn has_audience(&self, repository: &str) -> bool {
        self.payload
            .aud
            .iter()
            .any(|aud| aud.eq_ignore_ascii_case(repository))
    }

    /// Serialize and sign the token
    pub fn pack(&self, secret: &HmacSecret) -> Result<String> {
        let signing_input = format!(
            "{}.{}",
            encode_segment(&self.header)?,
            encode_segment(&self.payload)?
        );
        let signature = URL_SAFE_NO_PAD.encode(secret.sign(signing_input.as_bytes()));
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Verify the signature then decode the token, without checking its validity window
    pub fn unpack(token: &str, secret: &HmacSecret) -> Result<Self> {
        verify_signature(token, secret)?;

        let mut segments = token.split('.');
        let (Some(header), Some(payload)) = (segments.next(), segments.next()) else {
            return Err(ConfigServerError::InvalidJwt("missing segments".into()));
        };

        Ok(Self {
            header: decode_segment(header, "header")?,
            payload: decode_segment(payload, "payload")?,
        })
    }

    /// Verify, decode and require `nbf <= now <= exp`
    pub fn parse(token: &str, secret: &HmacSecret) -> Result<Self> {
        let jwt = Self::unpack(token, secret)?;
        let now = Utc::now().timestamp();

        if now < jwt.payload.nbf {
            return Err(ConfigServerError::InvalidJwt("token is not valid yet".into()));
        }
        if now > jwt.payload.exp {
            return Err(ConfigServerError::InvalidJwt("token is expired".into()));
        }

        Ok(jwt)
    }
}

/// Check the HMAC signature of a compact token
pub fn verify_signature(token: &str, secret: &HmacSecret) -> Result<()> {
    let components: Vec<&str> = token.split('.').collect();
    if components.len() != 3 {
        return Err(ConfigServerError::InvalidJwt(format!(
            "expecting three components but found {}",
            components.len()
        )));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(components[2])
        .map_err(|_| ConfigServerError::InvalidJwt("invalid token signature".into()))?;
    let signing_input = &token[..components[0].len() + 1 + components[1].len()];

    if !secret.verify(signing_input.as_bytes(), &signature) {
        return Err(ConfigServerError::InvalidJwt("invalid token signature".into()));
    }
    Ok(())
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)
        .map_err(|e| ConfigServerError::InvalidJwt(format!("cannot serialize: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T> {
    let json = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ConfigServerError::InvalidJwt(format!("{what} is not base64url: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| ConfigServerError::InvalidJwt(format!("unable to unmarshal {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(validity: Duration) -> JsonWebToken {
        JsonWebToken::new(
            "ConfigServer",
            "client-a",
            vec!["Repo1".into(), "repo2".into()],
            validity,
        )
        .unwrap()
    }

    #[test]
    fn test_pack_and_parse() {
        let secret = HmacSecret::generate();
        let jwt = token(Duration::hours(1));

        let packed = jwt.pack(&secret).unwrap();
        assert_eq!(packed.split('.').count(), 3);
        assert!(verify_signature(&packed, &secret).is_ok());

        let parsed = JsonWebToken::parse(&packed, &secret).unwrap();
        assert_eq!(parsed, jwt);
        assert_eq!(parsed.client_id(), "client-a");
        assert_eq!(parsed.expires_in(), 3600);
    }

    #[test]
    fn test_header_is_hs256() {
        let secret = HmacSecret::generate();
        let packed = token(Duration::hours(1)).pack(&secret).unwrap();
        let header = packed.split('.').next().unwrap();
        let json = URL_SAFE_NO_PAD.decode(header).unwrap();

        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&json).unwrap(),
            serde_json::json!({"alg": "HS256", "typ": "JWT"})
        );
    }

    #[test]
    fn test_any_mutation_breaks_signature() {
        let secret = HmacSecret::generate();
        let packed = token(Duration::hours(1)).pack(&secret).unwrap();

        for index in 0..packed.len() {
            if packed.as_bytes()[index] == b'.' {
                continue;
            }
            let mut bytes = packed.clone().into_bytes();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();

            assert!(
                verify_signature(&mutated, &secret).is_err(),
                "mutation at {index} was accepted"
            );
        }
    }

    #[test]
    fn test_unrepresentable_expiry_is_an_error() {
        let validity = Duration::try_days(1_000_000_000).unwrap();
        assert!(matches!(
            JsonWebToken::new("ConfigServer", "client-a", vec![], validity),
            Err(ConfigServerError::InvalidJwt(_))
        ));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let packed = token(Duration::hours(1)).pack(&HmacSecret::generate()).unwrap();
        assert!(JsonWebToken::parse(&packed, &HmacSecret::generate()).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let secret = HmacSecret::generate();
        let mut jwt = token(Duration::hours(1));
        jwt.payload.nbf -= 7200;
        jwt.payload.iat -= 7200;
        jwt.payload.exp -= 7200;
        let packed = jwt.pack(&secret).unwrap();

        assert!(JsonWebToken::unpack(&packed, &secret).is_ok());
        assert!(JsonWebToken::parse(&packed, &secret).is_err());
    }

    #[test]
    fn test_not_yet_valid_token_is_rejected() {
        let secret = HmacSecret::generate();
        let mut jwt = token(Duration::hours(1));
        jwt.payload.nbf += 600;
        let packed = jwt.pack(&secret).unwrap();

        assert!(JsonWebToken::parse(&packed, &secret).is_err());
    }

    #[test]
    fn test_malformed_tokens() {
        let secret = HmacSecret::generate();
        assert!(verify_signature("", &secret).is_err());
        assert!(verify_signature("a.b", &secret).is_err());
        assert!(verify_signature("a.b.c.d", &secret).is_err());
        assert!(verify_signature("a.b.!!!", &secret).is_err());
    }

    #[test]
    fn test_audience_is_case_insensitive() {
        let jwt = token(Duration::hours(1));
        assert!(jwt.has_audience("repo1"));
        assert!(jwt.has_audience("REPO2"));
        assert!(!jwt.has_audience("repo3"));
    }
}
