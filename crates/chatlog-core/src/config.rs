use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from chatlog.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatlogConfig {
    pub logging: LoggingConfig,
    pub decrypt: DecryptConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Container decryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptConfig {
    /// Storage directory below the account data directory (default: db_storage)
    pub storage_subdir: PathBuf,
    /// Directory holding the message shards, relative to the storage directory
    pub message_subdir: PathBuf,
    /// Contact container, relative to the storage directory
    pub contact_file: PathBuf,
    /// PBKDF2-HMAC-SHA512 rounds for the encryption key (default: 256000)
    pub kdf_iterations: u32,
    /// PBKDF2-HMAC-SHA512 rounds for the MAC key (default: 2)
    pub mac_iterations: u32,
}

/// Query engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// How far past "now" the newest shard's window extends, in seconds
    pub newest_shard_margin_secs: i64,
    /// Only return plain text messages unless a query says otherwise
    pub text_only: bool,
    /// Lower time bound used when a query has none (YYYY-MM-DD)
    pub default_start: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for DecryptConfig {
    fn default() -> Self {
        Self {
            storage_subdir: PathBuf::from("db_storage"),
            message_subdir: PathBuf::from("message"),
            contact_file: PathBuf::from("contact/contact.db"),
            kdf_iterations: 256_000,
            mac_iterations: 2,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            newest_shard_margin_secs: 3600,
            text_only: true,
            default_start: "2000-01-01".into(),
        }
    }
}
