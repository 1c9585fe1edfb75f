//! Credential storage. Secrets are kept as argon2 PHC strings with a fresh
//! 16-byte salt each; the clear text never reaches the entity store.

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use tracing::warn;

const SALT_LEN: usize = 16;

fn fresh_salt() -> Result<SaltString> {
    let mut raw = [0u8; SALT_LEN];
    getrandom::getrandom(&mut raw).context("no entropy for a credential salt")?;
    SaltString::encode_b64(&raw).map_err(|e| anyhow!("unable to encode credential salt: {}", e))
}

pub fn hash_credential(secret: &str) -> Result<String> {
    let salt = fresh_salt()?;
    let phc = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("unable to hash credential: {}", e))?;
    Ok(phc.to_string())
}

/// False for a wrong secret and for a stored value that is not a PHC string.
pub fn credential_matches(stored: &str, secret: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default().verify_password(secret.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!(target: "cloud_iam::auth", "stored credential is not a PHC string: {}", e);
            false
        }
    }
}
