//! Session credential storage
//!
//! Stores the session token in ~/.config/stru/credentials.json with restricted permissions (0o600)

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Saved login for the stru service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Session token issued after login
    pub token: String,
    /// User id to send with completion requests
    pub user_id: Option<String>,
    /// When the token was saved, in milliseconds
    pub saved_at: i64,
}

impl Credentials {
    pub fn new(token: String, user_id: Option<String>) -> Self {
        Self {
            token,
            user_id,
            saved_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Get the credentials file path
pub fn credentials_file() -> PathBuf {
    crate::config::Config::config_dir().join("credentials.json")
}

/// Load credentials from a file
pub fn load_credentials_from(path: &Path) -> Option<Credentials> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            tracing::warn!("Ignoring unreadable credentials file {}: {}", path.display(), e);
            None
        }
    }
}

/// Save credentials to a file, owner read/write only
pub fn save_credentials_to(path: &Path, credentials: &Credentials) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            // Set directory permissions to 0o700 on Unix
            #[cfg(unix)]
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
    }

    let content = serde_json::to_string_pretty(credentials)?;
    fs::write(path, content)?;

    // Set file permissions to 0o600 on Unix (owner read/write only)
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

/// Remove the credentials file if present
pub fn remove_credentials_at(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Load credentials from the default location
pub fn load_credentials() -> Option<Credentials> {
    load_credentials_from(&credentials_file())
}

/// Save credentials to the default location
pub fn save_credentials(credentials: &Credentials) -> io::Result<()> {
    save_credentials_to(&credentials_file(), credentials)
}

/// Remove credentials from the default location
pub fn remove_credentials() -> io::Result<()> {
    remove_credentials_at(&credentials_file())
}
