//! Self-contained client secrets.
//!
//! A secret is `base64(AES-GCM(<RFC3339 issued-at>|<client id>|<random suffix>))`.
//! Nothing is stored server side: possession of the AES key is enough to validate it.

use crate::crypto::CryptoKey;
use crate::error::{ConfigServerError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, warn};

pub const SEPARATOR: char = '|';
pub const COMPONENTS: usize = 3;
pub const SUFFIX_LENGTH: usize = 5;
pub const DEFAULT_VALIDITY_DAYS: i64 = 30;

/// How a secret's age is checked during validation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub validity: Duration,
    pub enforce: bool,
}

impl ExpiryPolicy {
    pub fn new(validity_days: u32, enforce: bool) -> Self {
        Self {
            validity: Duration::days(i64::from(validity_days)),
            enforce,
        }
    }

    pub fn warn_only() -> Self {
        Self {
            validity: Duration::days(DEFAULT_VALIDITY_DAYS),
            enforce: false,
        }
    }

    pub fn enforced() -> Self {
        Self {
            validity: Duration::days(DEFAULT_VALIDITY_DAYS),
            enforce: true,
        }
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::warn_only()
    }
}

/// Client identifiers end up inside the `|` separated payload and Basic credentials
pub fn check_client_id(client_id: &str) -> Result<()> {
    if client_id.is_empty() {
        return Err(ConfigServerError::Other("client id cannot be empty".into()));
    }
    if client_id.contains(SEPARATOR) || client_id.contains(':') {
        return Err(ConfigServerError::Other(format!(
            "client id '{client_id}' cannot contain '{SEPARATOR}' or ':'"
        )));
    }
    Ok(())
}

/// Mint a new secret for `client_id`
pub fn generate_client_secret(client_id: &str, key: &CryptoKey) -> Result<String> {
    generate_client_secret_at(client_id, key, Utc::now())
}

/// Mint a secret with an explicit issue time
pub fn generate_client_secret_at(
    client_id: &str,
    key: &CryptoKey,
    issued_at: DateTime<Utc>,
) -> Result<String> {
    check_client_id(client_id)?;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LENGTH)
        .map(char::from)
        .collect();
    let payload = format!(
        "{}{SEPARATOR}{client_id}{SEPARATOR}{suffix}",
        issued_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    Ok(STANDARD.encode(key.encrypt(payload.as_bytes())?))
}

/// Check that `secret` was minted with `key` for `client_id`
pub fn validate_client_secret(
    client_id: &str,
    secret: &str,
    key: &CryptoKey,
    policy: ExpiryPolicy,
) -> bool {
    let Ok(sealed) = STANDARD.decode(secret.trim()) else {
        debug!(client_id, "client secret is not valid base64");
        return false;
    };
    let Ok(opened) = key.decrypt(&sealed) else {
        debug!(client_id, "client secret cannot be decrypted");
        return false;
    };
    let Ok(payload) = String::from_utf8(opened) else {
        return false;
    };

    let elements: Vec<&str> = payload.split(SEPARATOR).collect();
    if elements.len() != COMPONENTS {
        debug!(
            client_id,
            components = elements.len(),
            "client secret has an unexpected layout"
        );
        return false;
    }

    let Ok(issued_at) = DateTime::parse_from_rfc3339(elements[0]) else {
        debug!(client_id, "client secret timestamp cannot be parsed");
        return false;
    };
    let issued_at = issued_at.with_timezone(&Utc);

    let expired = issued_at
        .checked_add_signed(policy.validity)
        .is_some_and(|expiry| expiry < Utc::now());
    if expired {
        warn!(
            client_id,
            issued_at = %issued_at,
            "client secret is older than its validity period, consider regenerating it"
        );
        if policy.enforce {
            return false;
        }
    }

    elements[1] == client_id
}
