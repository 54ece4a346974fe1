use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Failed to create config directory")]
    CreateDirError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SmtpSecurity {
    None,
    StartTLS,
    SSL,
}

/// Resolved delivery settings. The sending code never reads configuration
/// on its own; everything it needs is handed over from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sender_email: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_security: SmtpSecurity,
    pub smtp_username: String,
    /// Plain-text fallback only; the keyring entry for `sender_email` wins.
    pub smtp_password: Option<String>,
    /// Maximum raw size of a single attachment file, in bytes.
    pub max_file_size: u64,
    /// Maximum total encoded size of one outgoing message, in bytes.
    pub max_email_size: u64,
    /// Maximum number of attachments in one outgoing message.
    pub max_files_per_message: usize,
    /// Seconds to wait between successive message sends.
    pub send_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sender_email: "user@example.com".to_string(),
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_security: SmtpSecurity::StartTLS,
            smtp_username: "user@example.com".to_string(),
            smtp_password: None,
            max_file_size: 25 * 1024 * 1024,
            max_email_size: 25 * 1024 * 1024,
            max_files_per_message: 25,
            send_delay_secs: 1,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let path = Path::new(path);

        // If the file doesn't exist, return default config
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let path = Path::new(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::CreateDirError)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_secs(self.send_delay_secs)
    }
}
