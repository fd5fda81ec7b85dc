use crate::backends::RemoteStore;
use crate::models::notification::{KeyError, NotificationKey};
use crate::store::NotificationStateStore;
use std::io::{self, Write};

/// Run set → check → delete → check against whichever backend is reachable
/// right now and print one line per step. Returns true if every step passed.
pub fn run<R: RemoteStore, W: Write>(store: &NotificationStateStore<R>, out: &mut W) -> io::Result<bool> {
    let key = selftest_key().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut passed = true;

    writeln!(out, "notistate self-test")?;
    if store.probe_connectivity() {
        writeln!(out, "  • redis reachable, exercising key {}", store.storage_key(&key))?;
    } else {
        writeln!(out, "  • redis unreachable, exercising marker {}", store.markers().path(&key).display())?;
    }

    let set = store.set_notification_state(&key, Some(60));
    passed &= step(out, "set notification state", set.is_ok(), set.as_ref().ok().map(|b| b.label()))?;

    let seen = store.check_notification_state(&key);
    passed &= step(out, "check reports notified", seen, None)?;

    let del = store.delete_notification_state(&key);
    passed &= step(out, "delete notification state", del.is_ok(), del.as_ref().ok().map(|b| b.label()))?;

    let gone = !store.check_notification_state(&key);
    passed &= step(out, "check reports not notified", gone, None)?;

    writeln!(out, "{}", if passed { "All checks passed." } else { "Self-test FAILED." })?;
    Ok(passed)
}

/// `selftest-<host>-<pid>`, so concurrent runs on a shared Redis never touch
/// each other's key.
fn selftest_key() -> Result<NotificationKey, KeyError> {
    let host = std::fs::read_to_string("/proc/sys/kernel/hostname").unwrap_or_default();
    let host: String = host.trim().chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        .collect();
    let script = if host.is_empty() {
        format!("selftest-{}", std::process::id())
    } else {
        format!("selftest-{}-{}", host, std::process::id())
    };
    NotificationKey::new(&script, "hdd", "probe")
}

fn step<W: Write>(out: &mut W, name: &str, ok: bool, via: Option<&str>) -> io::Result<bool> {
    let mark = if ok { "✓" } else { "✗" };
    match via {
        Some(backend) => writeln!(out, "  {} {} (via {})", mark, name, backend)?,
        None          => writeln!(out, "  {} {}", mark, name)?,
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::config::{Config, MarkersConfig};
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> Config {
        Config {
            markers: MarkersConfig { dir: tmp.path().to_path_buf(), app_prefix: "ceph".into() },
            ..Config::default()
        }
    }

    #[test]
    fn key_is_unique_per_process() {
        let key = selftest_key().unwrap();
        assert!(key.script.starts_with("selftest-"));
        assert!(key.script.ends_with(&format!("-{}", std::process::id())));
    }

    #[test]
    fn passes_against_remote() {
        let tmp = TempDir::new().unwrap();
        let store = NotificationStateStore::new(MemoryStore::up(), &config(&tmp));
        let mut out = Vec::new();
        assert!(run(&store, &mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("redis reachable"));
        assert!(text.contains("✓ set notification state (via redis)"));
        assert!(!text.contains('✗'));
    }

    #[test]
    fn passes_against_markers_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let store = NotificationStateStore::new(MemoryStore::down(), &config(&tmp));
        let mut out = Vec::new();
        assert!(run(&store, &mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("via marker file"));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn reports_failure_when_nothing_is_writable() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config {
            markers: MarkersConfig { dir: tmp.path().join("gone"), app_prefix: "ceph".into() },
            ..Config::default()
        };
        let store = NotificationStateStore::new(MemoryStore::down(), &cfg);
        let mut out = Vec::new();
        assert!(!run(&store, &mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("✗ set notification state"));
        assert!(text.contains("Self-test FAILED."));
    }
}
