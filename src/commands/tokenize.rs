use anyhow::{Context, Result};
use configserver::token;
use configserver::Keystore;
use std::io::{self, Write};
use std::path::Path;

/// Print `file` with every `{enc:<plaintext>}` marker sealed
pub fn tokenize(file: &Path, keys: &Path) -> Result<()> {
    let keystore = Keystore::load(keys, false)?;
    let content =
        std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;

    let sealed = token::tokenize(&content, keystore.aes_key())?;
    io::stdout().write_all(&sealed)?;
    Ok(())
}
