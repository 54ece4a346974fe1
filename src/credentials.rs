use anyhow::{Context, Result};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "sendit-smtp";

/// Secure credential manager using system keyring
#[derive(Clone)]
pub struct CredentialManager;

impl CredentialManager {
    /// Store the SMTP password securely in the system keyring
    pub fn store_password(&self, sender: &str, password: &str) -> Result<()> {
        let entry = Entry::new(SERVICE, sender)
            .context("Failed to create keyring entry")?;

        entry.set_password(password)
            .context("Failed to store password in keyring")?;

        log::debug!("SMTP password stored securely for {}", sender);
        Ok(())
    }

    /// Retrieve the SMTP password from the system keyring
    pub fn get_password(&self, sender: &str) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE, sender)
            .context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("Failed to retrieve password: {}", e)),
        }
    }

    /// Delete the SMTP password from the system keyring
    pub fn delete_password(&self, sender: &str) -> Result<()> {
        let entry = Entry::new(SERVICE, sender)
            .context("Failed to create keyring entry")?;

        match entry.delete_password() {
            Ok(()) => {
                log::debug!("SMTP password deleted for {}", sender);
                Ok(())
            }
            Err(KeyringError::NoEntry) => {
                // Password doesn't exist, that's fine
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("Failed to delete password: {}", e)),
        }
    }

    /// Check if the system keyring is available
    pub fn is_available() -> bool {
        // Try to create a test entry to see if keyring is available
        if let Ok(entry) = Entry::new("sendit-smtp-test", "test") {
            if entry.set_password("test").is_ok() {
                let _ = entry.delete_password(); // Clean up
                return true;
            }
        }
        false
    }
}

/// Fallback credential storage for systems without keyring support
#[derive(Clone)]
pub struct FallbackCredentialManager {
    config_dir: String,
}

impl FallbackCredentialManager {
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("sendit")
            .join("credentials");

        std::fs::create_dir_all(&config_dir)
            .context("Failed to create credentials directory")?;

        Ok(Self {
            config_dir: config_dir.to_string_lossy().to_string(),
        })
    }

    pub fn store_password(&self, sender: &str, password: &str) -> Result<()> {
        // Less secure than the system keyring but better than plain text
        let file_path = format!("{}/{}.enc", self.config_dir, sender);

        let key = self.derive_key(sender);
        let encrypted = self.xor_encrypt(password.as_bytes(), &key);

        std::fs::write(&file_path, encrypted)
            .context("Failed to write encrypted password file")?;

        log::warn!("SMTP password stored with fallback encryption for {}", sender);
        log::warn!("Note: For better security, install GNOME Keyring or similar");
        Ok(())
    }

    pub fn get_password(&self, sender: &str) -> Result<Option<String>> {
        let file_path = format!("{}/{}.enc", self.config_dir, sender);

        if !std::path::Path::new(&file_path).exists() {
            return Ok(None);
        }

        let encrypted = std::fs::read(&file_path)
            .context("Failed to read encrypted password file")?;

        let key = self.derive_key(sender);
        let decrypted = self.xor_encrypt(&encrypted, &key);

        let password = String::from_utf8(decrypted)
            .context("Failed to decode password")?;

        Ok(Some(password))
    }

    pub fn delete_password(&self, sender: &str) -> Result<()> {
        let file_path = format!("{}/{}.enc", self.config_dir, sender);

        if std::path::Path::new(&file_path).exists() {
            std::fs::remove_file(&file_path)
                .context("Failed to delete password file")?;
        }

        log::debug!("SMTP password deleted for {}", sender);
        Ok(())
    }

    fn derive_key(&self, sender: &str) -> Vec<u8> {
        let mut key = Vec::new();
        let sender_bytes = sender.as_bytes();
        for i in 0..32 {
            key.push(sender_bytes[i % sender_bytes.len()] ^ (i as u8));
        }
        key
    }

    fn xor_encrypt(&self, data: &[u8], key: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, &byte)| byte ^ key[i % key.len()])
            .collect()
    }
}

/// Unified credential manager that tries system keyring first, then falls back
#[derive(Clone)]
pub enum SecureCredentials {
    SystemKeyring(CredentialManager),
    Fallback(FallbackCredentialManager),
}

impl SecureCredentials {
    /// Create a new secure credential manager
    pub fn new() -> Result<Self> {
        if CredentialManager::is_available() {
            Ok(Self::SystemKeyring(CredentialManager))
        } else {
            Ok(Self::Fallback(FallbackCredentialManager::new()?))
        }
    }

    pub fn store_password(&self, sender: &str, password: &str) -> Result<()> {
        match self {
            Self::SystemKeyring(manager) => manager.store_password(sender, password),
            Self::Fallback(manager) => manager.store_password(sender, password),
        }
    }

    pub fn get_password(&self, sender: &str) -> Result<Option<String>> {
        match self {
            Self::SystemKeyring(manager) => manager.get_password(sender),
            Self::Fallback(manager) => manager.get_password(sender),
        }
    }

    pub fn delete_password(&self, sender: &str) -> Result<()> {
        match self {
            Self::SystemKeyring(manager) => manager.delete_password(sender),
            Self::Fallback(manager) => manager.delete_password(sender),
        }
    }

    /// Resolve the SMTP password for a sender: keyring entry first, then the
    /// value from the config file.
    pub fn resolve_smtp_password(&self, sender: &str, config_value: Option<&str>) -> Result<String> {
        if let Some(password) = self.get_password(sender)? {
            return Ok(password);
        }

        config_value
            .map(|p| p.to_string())
            .context("No SMTP password found in keyring or config file")
    }
}
