use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::token::Credentials;

/// Persisted credential state. The process keeps at most one valid pair;
/// save overwrites, clear is idempotent.
#[cfg_attr(test, mockall::automock)]
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-memory store for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryTokenStore {
    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Option<Credentials>>> {
        self.credentials
            .lock()
            .map_err(|_| anyhow::anyhow!("Credential store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.locked()?.clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.locked()? = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.locked()? = None;
        Ok(())
    }
}

/// File-backed store: a JSON object with `accessToken`/`refreshToken` keys,
/// by default under the user config directory.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location, `<config dir>/blog-client/credentials.json`.
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir().context("Could not determine the user config directory")?;
        Ok(Self::new(dir.join("blog-client").join("credentials.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    #[tracing::instrument(skip(self))]
    fn load(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).context("Failed to read credential file")?;
        let credentials =
            serde_json::from_str(&contents).context("Failed to parse credential file")?;
        Ok(Some(credentials))
    }

    #[tracing::instrument(skip(self, credentials))]
    fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create credential directory")?;
        }
        let contents = serde_json::to_string_pretty(credentials)?;
        fs::write(&self.path, contents).context("Failed to write credential file")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove credential file"),
        }
    }
}
