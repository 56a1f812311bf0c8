//! Keyring-based storage for the catalog access token

use anyhow::{Context, Result};
use dialoguer::Password;
use keyring::Entry;
use tracing::{debug, info};

const KEYRING_SERVICE: &str = "tunedl";
const TOKEN_KEY: &str = "catalog:access_token";

/// Reads and writes the bearer token kept in the system keyring
pub struct TokenStore;

impl TokenStore {
    /// Store `token`, prompting for it when not given
    pub fn authenticate(token: Option<String>) -> Result<()> {
        let token = match token {
            Some(token) => token,
            None => Password::new()
                .with_prompt("Access token")
                .interact()
                .context("Failed to read access token")?,
        };
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Access token must not be empty");
        }

        Self::store(token)?;
        info!("Access token stored in keyring");
        Ok(())
    }

    /// Load the stored token
    pub fn load() -> Result<String> {
        Self::entry()?
            .get_password()
            .context("No access token in keyring")
    }

    pub fn store(token: &str) -> Result<()> {
        Self::entry()?
            .set_password(token)
            .context("Failed to store access token in keyring")?;
        debug!("Access token written to keyring");
        Ok(())
    }

    /// Remove the stored token, if any
    pub fn clear() -> Result<()> {
        let _ = Self::entry()?.delete_credential();
        info!("Access token cleared from keyring");
        Ok(())
    }

    fn entry() -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, TOKEN_KEY).context("Failed to access keyring")
    }
}
