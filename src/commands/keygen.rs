use anyhow::{bail, Result};
use configserver::key::{Keystore, RSA_KEY_BITS};
use std::path::Path;

/// Generate key material into a directory, never overwriting existing files
pub fn keygen(path: &Path, rsa: bool) -> Result<()> {
    println!("Generating key material in: {}", path.display());

    for name in Keystore::file_names(rsa) {
        let file = path.join(name);
        if file.exists() {
            bail!("{} already exists, refusing to overwrite it", file.display());
        }
    }

    let mut keystore = Keystore::generate();
    if rsa {
        println!("Generating a {RSA_KEY_BITS} bit RSA keypair, this may take a while...");
        keystore = keystore.with_generated_rsa(RSA_KEY_BITS)?;
    }
    keystore.save(path)?;

    for name in Keystore::file_names(rsa) {
        println!("  wrote {}", path.join(name).display());
    }
    println!("\nWARNING: Keep these files secure!");
    println!("Anyone holding them can decrypt every secret and mint client credentials.");

    Ok(())
}
