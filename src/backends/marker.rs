use crate::config::MarkersConfig;
use crate::models::notification::NotificationKey;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::PathBuf;

/// Same-host fallback: an empty file per key whose existence is the whole
/// signal. No TTL, no cross-host visibility.
pub struct MarkerFiles {
    dir:        PathBuf,
    app_prefix: String,
}

impl MarkerFiles {
    pub fn new(cfg: &MarkersConfig) -> Self {
        Self { dir: cfg.dir.clone(), app_prefix: cfg.app_prefix.clone() }
    }

    pub fn path(&self, key: &NotificationKey) -> PathBuf {
        key.marker_path(&self.dir, &self.app_prefix)
    }

    /// Create the marker (like `touch`); an existing marker is left as is.
    pub fn touch(&self, key: &NotificationKey) -> io::Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(key))
            .map(|_| ())
    }

    pub fn exists(&self, key: &NotificationKey) -> bool {
        self.path(key).is_file()
    }

    /// Idempotent: removing a missing marker is not an error.
    pub fn remove(&self, key: &NotificationKey) -> io::Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
