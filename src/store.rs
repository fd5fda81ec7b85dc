use crate::backends::marker::MarkerFiles;
use crate::backends::{RemoteStore, StoreError};
use crate::config::Config;
use crate::models::notification::{NotificationKey, NotificationRecord, Ttl};
use tracing::{debug, info, warn};

/// Where a composed operation ended up recording its effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Marker,
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Remote => "redis",
            Backend::Marker => "marker file",
        }
    }
}

/// "Already notified" bookkeeping for `(script, device class, state)` keys.
///
/// The `*_state` methods talk to the remote store only. The
/// `*_notification_state` methods pick a backend per call: remote when the
/// probe succeeds, marker files otherwise. The backends are never
/// synchronised, so a marker written during an outage is ignored by
/// `check_notification_state` and left behind by `delete_notification_state`
/// once the remote store is back.
pub struct NotificationStateStore<R> {
    remote:      R,
    markers:     MarkerFiles,
    key_prefix:  String,
    default_ttl: u64,
}

impl<R: RemoteStore> NotificationStateStore<R> {
    pub fn new(remote: R, cfg: &Config) -> Self {
        Self {
            remote,
            markers:     MarkerFiles::new(&cfg.markers),
            key_prefix:  cfg.keys.key_prefix.clone(),
            default_ttl: cfg.keys.default_ttl_secs.max(1),
        }
    }

    pub fn markers(&self) -> &MarkerFiles {
        &self.markers
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    pub fn storage_key(&self, key: &NotificationKey) -> String {
        key.storage_key(&self.key_prefix)
    }

    fn probe(&self) -> Result<(), StoreError> {
        self.remote.ping()
    }

    /// True only when redis-cli exists and the server answers PING in time.
    pub fn probe_connectivity(&self) -> bool {
        match self.probe() {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "connectivity probe failed");
                false
            }
        }
    }

    // ── Remote-only primitives ───────────────────────────────────────

    pub fn set_state(&self, key: &NotificationKey, ttl_secs: Option<u64>) -> Result<(), StoreError> {
        if let Err(e) = self.probe() {
            warn!(%key, error = %e, "redis not available, cannot set notification state");
            return Err(e);
        }
        let ttl = ttl_secs.unwrap_or(self.default_ttl).max(1);
        let now = chrono::Utc::now().timestamp().to_string();
        let storage_key = self.storage_key(key);
        match self.remote.set_ex(&storage_key, &now, ttl) {
            Ok(()) => {
                debug!(key = %storage_key, ttl, "notification state set");
                Ok(())
            }
            Err(e) => {
                warn!(key = %storage_key, error = %e, "failed to set notification state in redis");
                Err(e)
            }
        }
    }

    pub fn check_state(&self, key: &NotificationKey) -> bool {
        if let Err(e) = self.probe() {
            warn!(%key, error = %e, "redis not available, cannot check notification state");
            return false;
        }
        let storage_key = self.storage_key(key);
        match self.remote.exists(&storage_key) {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "failed to check notification state in redis");
                false
            }
        }
    }

    /// Succeeds whether or not the key existed.
    pub fn delete_state(&self, key: &NotificationKey) -> Result<(), StoreError> {
        if let Err(e) = self.probe() {
            warn!(%key, error = %e, "redis not available, cannot delete notification state");
            return Err(e);
        }
        let storage_key = self.storage_key(key);
        match self.remote.del(&storage_key) {
            Ok(removed) => {
                debug!(key = %storage_key, removed, "notification state deleted");
                Ok(())
            }
            Err(e) => {
                warn!(key = %storage_key, error = %e, "failed to delete notification state in redis");
                Err(e)
            }
        }
    }

    /// Keys under `<prefix>:<pattern>*`. Values and TTLs are fetched as the
    /// iterator is consumed; every call re-scans.
    pub fn list_states<'a>(
        &'a self,
        pattern: &str,
    ) -> Result<impl Iterator<Item = Result<NotificationRecord, StoreError>> + 'a, StoreError> {
        if let Err(e) = self.probe() {
            warn!(error = %e, "redis not available, cannot list notification states");
            return Err(e);
        }
        let glob = format!("{}:{}*", self.key_prefix, pattern);
        let keys = self.remote.scan(&glob)?;
        debug!(pattern = %glob, count = keys.len(), "scanned notification keys");
        Ok(keys.into_iter().map(move |key| self.inspect(key)))
    }

    fn inspect(&self, key: String) -> Result<NotificationRecord, StoreError> {
        let value = self.remote.get(&key)?;
        let ttl = Ttl::from_reply(self.remote.ttl(&key)?);
        Ok(NotificationRecord { key, value, ttl })
    }

    /// Give the default TTL to matching keys that have none. Returns how many
    /// keys were touched; a second run returns 0.
    pub fn reconcile_missing_ttl(&self, pattern: &str) -> Result<usize, StoreError> {
        let mut touched = 0;
        for record in self.list_states(pattern)? {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "skipping key during TTL reconcile");
                    continue;
                }
            };
            if record.ttl != Ttl::Persistent {
                continue;
            }
            match self.remote.expire(&record.key, self.default_ttl) {
                Ok(true) => {
                    info!(key = %record.key, ttl = self.default_ttl, "applied missing TTL");
                    touched += 1;
                }
                Ok(false) => debug!(key = %record.key, "key vanished before EXPIRE"),
                Err(e) => warn!(key = %record.key, error = %e, "failed to apply TTL"),
            }
        }
        Ok(touched)
    }

    // ── Composed operations ──────────────────────────────────────────

    /// Remote first; on any failure, touch the local marker instead.
    pub fn set_notification_state(&self, key: &NotificationKey, ttl_secs: Option<u64>) -> Result<Backend, StoreError> {
        if self.set_state(key, ttl_secs).is_ok() {
            return Ok(Backend::Remote);
        }
        let path = self.markers.path(key);
        warn!(%key, path = %path.display(), "falling back to local marker file");
        self.markers.touch(key).map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to create marker file");
            StoreError::Io(e)
        })?;
        Ok(Backend::Marker)
    }

    /// Remote answer when reachable (markers are not consulted), marker
    /// existence otherwise.
    pub fn check_notification_state(&self, key: &NotificationKey) -> bool {
        if self.probe_connectivity() {
            self.check_state(key)
        } else {
            self.markers.exists(key)
        }
    }

    /// Remote delete when reachable, marker removal otherwise. Never both.
    pub fn delete_notification_state(&self, key: &NotificationKey) -> Result<Backend, StoreError> {
        if self.probe_connectivity() {
            self.delete_state(key)?;
            return Ok(Backend::Remote);
        }
        self.markers.remove(key).map_err(|e| {
            warn!(%key, error = %e, "failed to remove marker file");
            StoreError::Io(e)
        })?;
        Ok(Backend::Marker)
    }
}
