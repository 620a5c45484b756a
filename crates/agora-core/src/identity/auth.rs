//! Key-material handling: parse, generate, encrypt-at-rest, restore.
//!
//! Secrets are persisted in the credentials table as bech32: plain `nsec`
//! when no password was given, NIP-49 `ncryptsec` otherwise.

use nostr_sdk::nips::nip49::EncryptedSecretKey;
use nostr_sdk::prelude::*;

use crate::error::AuthError;
use crate::store::Database;

/// Parse a bech32 nsec or raw hex secret and persist it.
pub fn login_with_nsec(
    nsec: &str,
    password: Option<&str>,
    db: &Database,
) -> Result<Keys, AuthError> {
    let secret_key =
        SecretKey::parse(nsec).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
    let keys = Keys::new(secret_key);
    persist_keys(&keys, password, db)?;
    Ok(keys)
}

/// Generate a fresh keypair and persist it.
pub fn generate_keys(password: Option<&str>, db: &Database) -> Result<Keys, AuthError> {
    let keys = Keys::generate();
    persist_keys(&keys, password, db)?;
    Ok(keys)
}

fn persist_keys(keys: &Keys, password: Option<&str>, db: &Database) -> Result<(), AuthError> {
    let secret = match password.filter(|p| !p.is_empty()) {
        Some(pwd) => {
            let encrypted = keys
                .secret_key()
                .encrypt(pwd)
                .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
            encrypted
                .to_bech32()
                .map_err(|e| AuthError::InvalidKey(e.to_string()))?
        }
        None => keys
            .secret_key()
            .to_bech32()
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?,
    };
    db.store_credentials(&secret)?;
    Ok(())
}

/// Load the persisted key. Encrypted entries require the password that
/// encrypted them; plain entries ignore `password`.
pub fn load_stored_keys(password: Option<&str>, db: &Database) -> Result<Keys, AuthError> {
    let stored = db
        .get_stored_credentials()?
        .ok_or(AuthError::NoCredentials)?;

    let secret_key = if stored.starts_with("ncryptsec") {
        let pwd = password
            .filter(|p| !p.is_empty())
            .ok_or(AuthError::PasswordRequired)?;
        let encrypted = EncryptedSecretKey::from_bech32(&stored)
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        encrypted
            .decrypt(pwd)
            .map_err(|e| AuthError::Decrypt(e.to_string()))?
    } else {
        SecretKey::parse(&stored).map_err(|e| AuthError::InvalidKey(e.to_string()))?
    };

    Ok(Keys::new(secret_key))
}

pub fn has_stored_credentials(db: &Database) -> bool {
    db.has_stored_credentials()
}

/// Whether the stored entry needs a password to unlock.
pub fn credentials_need_password(db: &Database) -> bool {
    matches!(
        db.get_stored_credentials(),
        Ok(Some(stored)) if stored.starts_with("ncryptsec")
    )
}
