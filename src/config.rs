use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub keys: KeysConfig,

    #[serde(default)]
    pub markers: MarkersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis host shared by every node that sends notifications
    pub host: String,
    pub port: u16,
    /// Logical database index (`redis-cli -n`)
    #[serde(default)]
    pub db: u32,
    /// Empty = no AUTH. Handed to redis-cli through REDISCLI_AUTH, never argv.
    #[serde(default)]
    pub password: String,
    /// Upper bound for every redis-cli invocation, including the PING probe
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Prepended to `script:class:state` to form the Redis key
    pub key_prefix: String,
    /// Expiration applied when the caller does not pass one
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkersConfig {
    /// Directory holding the fallback `*-notified` marker files
    pub dir: PathBuf,
    /// First dash-separated component of every marker file name
    pub app_prefix: String,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host:         "192.168.1.10".into(),
            port:         6379,
            db:           0,
            password:     String::new(),
            timeout_secs: 5,
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self { key_prefix: "ceph:notification".into(), default_ttl_secs: 3600 }
    }
}

impl Default for MarkersConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("/tmp"), app_prefix: "ceph".into() }
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    /// File values (or defaults when the file is missing), then environment
    /// overrides. A file that exists but does not parse is an error.
    pub fn load() -> Result<Self> {
        let mut cfg = match Self::config_path() {
            Some(path) if path.exists() => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            _ => {
                // Write defaults on first run (best-effort)
                if let Err(e) = try_write_defaults() {
                    tracing::debug!(error = %e, "could not write default config");
                }
                Config::default()
            }
        };
        cfg.apply_env(|name| std::env::var(name).ok())?;
        Ok(cfg)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("notistate").join("notistate.toml"))
    }

    /// Apply `REDIS_*` / `NOTISTATE_*` overrides. `lookup` is injectable so
    /// tests don't have to touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REDIS_HOST") {
            self.redis.host = host;
        }
        if let Some(port) = lookup("REDIS_PORT") {
            self.redis.port = port.trim().parse()
                .with_context(|| format!("REDIS_PORT is not a valid port: {:?}", port))?;
        }
        if let Some(timeout) = lookup("REDIS_TIMEOUT") {
            self.redis.timeout_secs = timeout.trim().parse()
                .with_context(|| format!("REDIS_TIMEOUT is not a number of seconds: {:?}", timeout))?;
        }
        if let Some(db) = lookup("REDIS_DB") {
            self.redis.db = db.trim().parse()
                .with_context(|| format!("REDIS_DB is not a database index: {:?}", db))?;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.redis.password = password;
        }
        if let Some(dir) = lookup("NOTISTATE_MARKER_DIR") {
            self.markers.dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

fn try_write_defaults() -> Result<()> {
    let path = Config::config_path().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&Config::default())?;
    fs::write(path, format!("# notistate configuration\n# Generated on first run, edit freely\n\n{}", text))?;
    Ok(())
}
