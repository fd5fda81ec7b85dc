use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} {value:?} contains {ch:?}, which is not allowed in a notification key")]
    BadChar { field: &'static str, value: String, ch: char },
}

/// Identity of one notification: which script raised which state for which
/// class of device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub script:       String,
    pub device_class: String,
    pub state:        String,
}

impl NotificationKey {
    pub fn new(script: &str, device_class: &str, state: &str) -> Result<Self, KeyError> {
        validate_part("script", script)?;
        validate_part("device class", device_class)?;
        validate_part("state", state)?;
        Ok(Self {
            script:       script.to_string(),
            device_class: device_class.to_string(),
            state:        state.to_string(),
        })
    }

    /// `<prefix>:<script>:<class>:<state>`
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}:{}:{}:{}", prefix, self.script, self.device_class, self.state)
    }

    /// `<dir>/<app>-<script>-<class>-<state>-notified`
    pub fn marker_path(&self, dir: &Path, app_prefix: &str) -> PathBuf {
        dir.join(format!(
            "{}-{}-{}-{}-notified",
            app_prefix, self.script, self.device_class, self.state
        ))
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.script, self.device_class, self.state)
    }
}

// `/` escapes the marker dir, `:` breaks the key layout, globs leak into SCAN.
fn validate_part(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { field });
    }
    if let Some(ch) = value.chars().find(|c| {
        c.is_whitespace() || c.is_control() || matches!(c, '/' | ':' | '*' | '?' | '[' | ']' | '\\')
    }) {
        return Err(KeyError::BadChar { field, value: value.to_string(), ch });
    }
    Ok(())
}

/// Remaining lifetime of a remote key, as reported by Redis `TTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "secs", rename_all = "snake_case")]
pub enum Ttl {
    Expires(u64),
    /// Key exists but has no expiration (`-1`)
    Persistent,
    /// Key is gone (`-2`)
    Missing,
}

impl Ttl {
    pub fn from_reply(secs: i64) -> Self {
        match secs {
            -1           => Ttl::Persistent,
            s if s < 0   => Ttl::Missing,
            s            => Ttl::Expires(s as u64),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Ttl::Expires(s)  => format!("{}s", s),
            Ttl::Persistent  => "no expiry".to_string(),
            Ttl::Missing     => "gone".to_string(),
        }
    }
}

/// One entry of `list_states`: the raw key, its stored timestamp and TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    pub key:   String,
    /// Unix timestamp written by `set`; None if the key vanished mid-listing
    pub value: Option<String>,
    pub ttl:   Ttl,
}

impl NotificationRecord {
    /// Human-readable set time, falling back to the raw value.
    pub fn set_at(&self) -> String {
        let Some(raw) = &self.value else { return "-".to_string() };
        raw.trim().parse::<i64>().ok()
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_joins_with_colons() {
        let key = NotificationKey::new("test", "hdd", "paused").unwrap();
        assert_eq!(key.storage_key("ceph:notification"), "ceph:notification:test:hdd:paused");
    }

    #[test]
    fn marker_path_matches_fallback_layout() {
        let key = NotificationKey::new("x", "ssd", "warn").unwrap();
        assert_eq!(
            key.marker_path(Path::new("/tmp"), "ceph"),
            PathBuf::from("/tmp/ceph-x-ssd-warn-notified")
        );
    }

    #[test]
    fn rejects_parts_that_escape_or_glob() {
        assert_eq!(
            NotificationKey::new("", "hdd", "warn"),
            Err(KeyError::Empty { field: "script" })
        );
        assert!(matches!(
            NotificationKey::new("../etc", "hdd", "warn"),
            Err(KeyError::BadChar { ch: '/', .. })
        ));
        assert!(matches!(
            NotificationKey::new("osd", "hdd:1", "warn"),
            Err(KeyError::BadChar { field: "device class", ch: ':', .. })
        ));
        assert!(NotificationKey::new("osd", "hdd", "wa*rn").is_err());
        assert!(NotificationKey::new("osd", "nvme", "near full").is_err());
    }

    #[test]
    fn ttl_reply_sentinels() {
        assert_eq!(Ttl::from_reply(42), Ttl::Expires(42));
        assert_eq!(Ttl::from_reply(0), Ttl::Expires(0));
        assert_eq!(Ttl::from_reply(-1), Ttl::Persistent);
        assert_eq!(Ttl::from_reply(-2), Ttl::Missing);
    }

    #[test]
    fn set_at_falls_back_to_raw_value() {
        let rec = NotificationRecord { key: "k".into(), value: Some("not-a-time".into()), ttl: Ttl::Persistent };
        assert_eq!(rec.set_at(), "not-a-time");
        let gone = NotificationRecord { key: "k".into(), value: None, ttl: Ttl::Missing };
        assert_eq!(gone.set_at(), "-");
    }
}
