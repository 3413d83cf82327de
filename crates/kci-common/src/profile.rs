//! Profile persistence.
//!
//! A profile holds the local long-term keypair as hex strings:
//!
//! ```json
//! {
//!   "public_key": "<64 hex chars>",
//!   "secret_key": "<64 hex chars>"
//! }
//! ```
//!
//! Decoding the hex into key material is the key store's job; this module only
//! moves the file on and off disk.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default profile location, relative to the working directory.
pub const DEFAULT_PROFILE_PATH: &str = "profile.json";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub public_key: String,
    pub secret_key: String,
}

impl Profile {
    pub fn new(public_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Load a profile from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::not_found(format!(
                    "profile {} (run `kci-demo init` first)",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let profile: Self = serde_json::from_slice(&data)?;
        debug!("loaded profile from {}", path.display());
        Ok(profile)
    }

    /// Write a new profile. Refuses to overwrite an existing file.
    ///
    /// The file is created with restricted permissions (0600 on Unix).
    pub fn create(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = match options.open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::config(format!(
                    "profile {} already exists",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        debug!("wrote profile to {}", path.display());
        Ok(())
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
