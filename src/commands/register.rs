use anyhow::Result;
use configserver::secret::generate_client_secret;
use configserver::Keystore;
use std::path::Path;

/// Mint a client secret with the keys stored in `keys`
pub fn register(client_id: &str, keys: &Path) -> Result<()> {
    let keystore = Keystore::load(keys, false)?;
    let secret = generate_client_secret(client_id, keystore.aes_key())?;

    println!("Client ID:     {client_id}");
    println!("Client secret: {secret}");
    Ok(())
}
