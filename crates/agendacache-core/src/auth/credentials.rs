use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "agendacache";

/// Refresh tokens kept in the OS keychain, one per account email.
pub struct CredentialStore;

impl CredentialStore {
    pub fn store_refresh_token(email: &str, refresh_token: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, email)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(refresh_token)
            .context("Failed to store refresh token in keychain")?;
        Ok(())
    }

    pub fn get_refresh_token(email: &str) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, email)
            .context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve refresh token from keychain")
    }

    pub fn delete(email: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, email)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }
}
