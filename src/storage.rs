//! Backend credentials in the OS credential store.
//!
//! Windows Credential Manager, macOS Keychain and the Linux Secret Service,
//! all through the `keyring` crate.

use keyring::Entry;
use tracing::{info, warn};

use crate::error::{Error, Result};

const SERVICE_NAME: &str = "pos-backoffice";

pub const KEY_SUPABASE_URL: &str = "supabase_url";
pub const KEY_SUPABASE_ANON_KEY: &str = "supabase_anon_key";

const ALL_KEYS: &[&str] = &[KEY_SUPABASE_URL, KEY_SUPABASE_ANON_KEY];

fn keyring_error(key: &str, err: keyring::Error) -> Error {
    Error::Config(format!("credential store error for {key}: {err}"))
}

/// Read one credential. `None` when the entry is missing or the platform
/// store cannot be reached.
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

pub fn set_credential(key: &str, value: &str) -> Result<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| keyring_error(key, e))?;
    entry.set_password(value).map_err(|e| keyring_error(key, e))
}

/// Delete a credential. A missing entry is not an error.
pub fn delete_credential(key: &str) -> Result<()> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| keyring_error(key, e))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(key, e)),
    }
}

/// Persist the backend URL and anon key after onboarding. The URL is
/// normalised before it is stored.
pub fn store_backend_credentials(url: &str, anon_key: &str) -> Result<()> {
    let url = crate::config::normalize_backend_url(url);
    let anon_key = anon_key.trim();
    if url.is_empty() || anon_key.is_empty() {
        return Err(Error::validation("backend URL and anon key are both required"));
    }
    set_credential(KEY_SUPABASE_URL, &url)?;
    set_credential(KEY_SUPABASE_ANON_KEY, anon_key)?;
    info!(url = %url, "backend credentials stored");
    Ok(())
}

/// Forget the stored backend credentials.
pub fn clear_backend_credentials() -> Result<()> {
    info!("clearing backend credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_rejects_blank_values_before_touching_keyring() {
        let err = store_backend_credentials("   ", "key").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = store_backend_credentials("demo.supabase.co", " ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
