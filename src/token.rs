//! # Substitution Tokens
//!
//! Secrets live inside otherwise plain configuration files as
//! `{enc:<base64 of nonce || ciphertext || tag>}` spans.
//!
//! - [`tokenize`] seals authoring markers (`{enc:<plaintext>}`) before a file is committed
//! - [`detokenize`] opens every sealed span when a file is served
//!
//! Matching is non-greedy so several tokens can share a line. A span that fails to
//! open is left as is: one corrupt token must not blank the whole file.

use crate::crypto::CryptoKey;
use crate::error::{ConfigServerError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::OnceLock;

pub const TOKEN_PREFIX: &str = "{enc:";
pub const TOKEN_SUFFIX: &str = "}";

fn token_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{enc:(.*?)\}").expect("valid token regex"))
}

fn content_regex() -> &'static regex::bytes::Regex {
    static RE: OnceLock<regex::bytes::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::bytes::Regex::new(r"(?-u)\{enc:(.*?)\}").expect("valid token regex")
    })
}

/// Encrypt a single value into a substitution token
pub fn create_token(plaintext: &[u8], key: &CryptoKey) -> Result<String> {
    let sealed = key.encrypt(plaintext)?;
    Ok(format!("{TOKEN_PREFIX}{}{TOKEN_SUFFIX}", STANDARD.encode(sealed)))
}

/// Extract the first token found in `token` and decrypt its payload
pub fn decrypt_token(token: &str, key: &CryptoKey) -> Result<Vec<u8>> {
    let captures = token_regex()
        .captures(token)
        .ok_or(ConfigServerError::InvalidToken)?;

    open_payload(captures[1].as_bytes(), key).ok_or(ConfigServerError::CannotDecryptToken)
}

fn open_payload(payload: &[u8], key: &CryptoKey) -> Option<Vec<u8>> {
    let decoded = STANDARD.decode(payload).ok()?;
    key.decrypt(&decoded).ok()
}

/// Replace every `{enc:<plaintext>}` marker with a freshly sealed token.
///
/// Spans whose content already opens under `key` are kept verbatim.
pub fn tokenize(content: &[u8], key: &CryptoKey) -> Result<Vec<u8>> {
    tokenize_counted(content, key).map(|(output, _)| output)
}

/// [`tokenize`], also returning how many spans were newly sealed
pub fn tokenize_counted(content: &[u8], key: &CryptoKey) -> Result<(Vec<u8>, usize)> {
    let mut output = Vec::with_capacity(content.len());
    let mut last = 0;
    let mut sealed = 0;

    for captures in content_regex().captures_iter(content) {
        let (Some(span), Some(value)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        output.extend_from_slice(&content[last..span.start()]);

        if open_payload(value.as_bytes(), key).is_some() {
            output.extend_from_slice(span.as_bytes());
        } else {
            output.extend_from_slice(create_token(value.as_bytes(), key)?.as_bytes());
            sealed += 1;
        }
        last = span.end();
    }

    output.extend_from_slice(&content[last..]);
    Ok((output, sealed))
}

/// Replace every sealed span with its plaintext
pub fn detokenize(content: &[u8], key: &CryptoKey) -> Vec<u8> {
    content_regex()
        .replace_all(content, |captures: &regex::bytes::Captures<'_>| {
            match open_payload(&captures[1], key) {
                Some(plaintext) => plaintext,
                None => {
                    tracing::debug!("leaving undecryptable substitution token in place");
                    captures[0].to_vec()
                }
            }
        })
        .into_owned()
}
