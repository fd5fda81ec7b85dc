use super::{RemoteStore, StoreError};
use crate::config::RedisConfig;
use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// `RemoteStore` backed by the stock `redis-cli` binary. One child process per
/// primitive, each bounded by the configured timeout.
pub struct RedisCli {
    program:  String,
    host:     String,
    port:     u16,
    db:       u32,
    password: String,
    timeout:  u64,
}

struct Output {
    success: bool,
    stdout:  String,
    stderr:  String,
}

impl RedisCli {
    pub fn new(cfg: &RedisConfig) -> Self {
        Self {
            program:  "redis-cli".into(),
            host:     cfg.host.clone(),
            port:     cfg.port,
            db:       cfg.db,
            password: cfg.password.clone(),
            timeout:  cfg.timeout_secs.max(1),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-h").arg(&self.host)
            .arg("-p").arg(self.port.to_string())
            .arg("-n").arg(self.db.to_string())
            .arg("--raw")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !self.password.is_empty() {
            cmd.env("REDISCLI_AUTH", &self.password);
        }
        cmd
    }

    /// Spawn redis-cli and wait at most `timeout` seconds for it.
    fn run(&self, args: &[&str]) -> Result<Output, StoreError> {
        debug!(host = %self.host, port = self.port, ?args, "redis-cli");
        let mut child = match self.command(args).spawn() {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::ClientMissing),
            Err(e) => return Err(e.into()),
        };

        // Drain pipes on their own threads so a large --scan can't fill the
        // pipe buffer and stall the child past the deadline.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_deadline(&mut child, Duration::from_secs(self.timeout))? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StoreError::Timeout(self.timeout));
            }
        };

        Ok(Output {
            success: status.success(),
            stdout:  stdout.join().unwrap_or_default(),
            stderr:  stderr.join().unwrap_or_default(),
        })
    }

    /// Run and return stdout, mapping transport failures and error replies.
    fn call(&self, args: &[&str]) -> Result<String, StoreError> {
        let out = self.run(args)?;
        if let Some(err) = classify_failure(&out.stderr, Some(&out.stdout), out.success) {
            return Err(err);
        }
        Ok(out.stdout)
    }

    /// Like `call`, for replies that carry stored data (GET values, SCAN key
    /// names). Their stdout is never read as an error reply.
    fn call_data(&self, args: &[&str]) -> Result<String, StoreError> {
        let out = self.run(args)?;
        if let Some(err) = classify_failure(&out.stderr, None, out.success) {
            return Err(err);
        }
        Ok(out.stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_string(&mut buf);
        }
        buf
    })
}

fn wait_deadline(child: &mut Child, limit: Duration) -> std::io::Result<Option<std::process::ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= limit {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

const ERROR_PREFIXES: &[&str] = &[
    "(error)", "ERR", "WRONGTYPE", "NOAUTH", "NOPERM", "WRONGPASS",
    "READONLY", "LOADING", "MISCONF", "BUSY", "MASTERDOWN",
];

fn is_error_reply(line: &str) -> bool {
    ERROR_PREFIXES.iter().any(|p| {
        line.strip_prefix(*p).is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
    })
}

/// redis-cli reports connection problems on stderr with a non-zero exit, but
/// error replies may come back on stdout with exit 0 depending on version.
/// `reply` is None when stdout is user data; otherwise only its first line
/// can be an error reply.
fn classify_failure(stderr: &str, reply: Option<&str>, success: bool) -> Option<StoreError> {
    let err_line = stderr.lines().map(str::trim).find(|l| !l.is_empty());
    if let Some(line) = err_line {
        if line.starts_with("Could not connect") || line.contains("Connection refused") {
            return Some(StoreError::Unreachable(line.to_string()));
        }
        if is_error_reply(line) {
            return Some(StoreError::Command(line.to_string()));
        }
    }
    if let Some(line) = reply.map(first_line).filter(|l| is_error_reply(l)) {
        return Some(StoreError::Command(line.to_string()));
    }
    if !success {
        let msg = err_line.unwrap_or("non-zero exit status").to_string();
        return Some(StoreError::Command(msg));
    }
    None
}

fn first_line(stdout: &str) -> &str {
    stdout.lines().next().unwrap_or("").trim()
}

fn parse_int(command: &'static str, stdout: &str) -> Result<i64, StoreError> {
    let line = first_line(stdout);
    line.parse().map_err(|_| StoreError::Reply { command, reply: line.to_string() })
}

fn parse_keys(stdout: &str) -> Vec<String> {
    let mut keys: Vec<String> = stdout.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    // SCAN may return a key more than once
    keys.sort();
    keys.dedup();
    keys
}

impl RemoteStore for RedisCli {
    fn ping(&self) -> Result<(), StoreError> {
        let out = self.call(&["PING"])?;
        match first_line(&out) {
            "PONG" => Ok(()),
            other  => Err(StoreError::Reply { command: "PING", reply: other.to_string() }),
        }
    }

    fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let ttl = ttl_secs.to_string();
        let out = self.call(&["SET", key, value, "EX", &ttl])?;
        match first_line(&out) {
            "OK"  => Ok(()),
            other => Err(StoreError::Reply { command: "SET", reply: other.to_string() }),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(parse_int("EXISTS", &self.call(&["EXISTS", key])?)? == 1)
    }

    fn del(&self, key: &str) -> Result<u64, StoreError> {
        Ok(parse_int("DEL", &self.call(&["DEL", key])?)?.max(0) as u64)
    }

    fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        Ok(parse_keys(&self.call_data(&["--scan", "--pattern", pattern])?))
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        // --raw prints nil as an empty line
        let out = self.call_data(&["GET", key])?;
        let value = out.strip_suffix('\n').unwrap_or(&out);
        Ok(if value.is_empty() { None } else { Some(value.to_string()) })
    }

    fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        parse_int("TTL", &self.call(&["TTL", key])?)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let ttl = ttl_secs.to_string();
        Ok(parse_int("EXPIRE", &self.call(&["EXPIRE", key, &ttl])?)? == 1)
    }
}
