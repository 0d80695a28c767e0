use anyhow::Result;
use configserver::token::create_token;
use configserver::Keystore;
use std::path::Path;

pub fn encrypt(value: &str, keys: &Path) -> Result<()> {
    let keystore = Keystore::load(keys, false)?;
    println!("{}", create_token(value.as_bytes(), keystore.aes_key())?);
    Ok(())
}
