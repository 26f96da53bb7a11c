//! Persistent storage for the session credential.
//!
//! A successful login yields a [`Credential`] that the client keeps on disk
//! so later runs can resume the session without a fresh handshake. The store
//! holds at most one credential; each login overwrites the previous one.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use protocol::Credential;
use tracing::debug;

/// Where session credentials live. Abstracted so tests and alternative
/// frontends can supply their own persistence.
pub trait SessionStore {
    /// Persists `credential`, replacing any previous one.
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Loads the stored credential, if any. A missing file is `None`, not an
    /// error; an unreadable or corrupt file is an error.
    fn load(&self) -> Result<Option<Credential>>;

    /// Removes the stored credential. Removing a missing credential is fine.
    fn clear(&self) -> Result<()>;
}

/// JSON file store, by default under the user config directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileSessionStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create credential dir: {}", parent.display())
            })?;
        }

        let contents =
            serde_json::to_string_pretty(credential).context("Failed to serialize credential")?;

        // Write-then-rename keeps a crash from leaving a half-written file.
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &contents).with_context(|| {
            format!("Failed to write credential file: {}", temp_path.display())
        })?;
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!("Failed to move credential file into place: {}", self.path.display())
        })?;

        debug!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credential file: {}", self.path.display()))?;
        let credential =
            serde_json::from_str(&contents).context("Failed to parse credential file")?;
        Ok(Some(credential))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "credential cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove credential file: {}", self.path.display())
            }),
        }
    }
}
