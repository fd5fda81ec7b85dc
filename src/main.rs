mod backends;
mod config;
mod models;
mod selftest;
mod store;

use anyhow::{Context, Result};
use backends::redis_cli::RedisCli;
use clap::{Args, CommandFactory, Parser, Subcommand};
use models::notification::{NotificationKey, NotificationRecord};
use std::io;
use std::process;
use store::NotificationStateStore;
use tracing_subscriber::EnvFilter;

type Store = NotificationStateStore<RedisCli>;

#[derive(Parser, Debug)]
#[command(name = "notistate", about = "Suppress duplicate health notifications across hosts", version)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Name of the script sending the notification
    script: String,
    /// Device class, e.g. hdd, ssd, nvme
    device_class: String,
    /// Notification state, e.g. warn, crit, paused
    state: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record that a notification was sent (exit 0 = recorded)
    Set {
        #[command(flatten)]
        key: KeyArgs,
        /// Expiration in seconds (default from config, 3600)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        ttl: Option<u64>,
        /// Write to redis only, no marker-file fallback
        #[arg(long)]
        remote_only: bool,
    },
    /// Exit 0 if the notification was already sent, 1 otherwise
    Check {
        #[command(flatten)]
        key: KeyArgs,
        /// Ask redis only, never the marker files
        #[arg(long)]
        remote_only: bool,
    },
    /// Forget a sent notification (idempotent)
    Delete {
        #[command(flatten)]
        key: KeyArgs,
        /// Delete from redis only
        #[arg(long)]
        remote_only: bool,
    },
    /// List recorded notifications with their set time and TTL
    List {
        /// Script name pattern (glob)
        #[arg(default_value = "*")]
        pattern: String,
        /// Print a JSON array instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Apply the default TTL to keys that have no expiration
    Reconcile {
        /// Script name pattern (glob)
        #[arg(default_value = "*")]
        pattern: String,
    },
    /// Exit 0 if redis answers PING within the timeout
    Ping,
    /// Run a set/check/delete cycle and print the result of each step
    SelfTest,
    /// Print config file path and current values, then exit
    Config,
    /// Print a shell completion script
    Completions {
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "notistate", &mut io::stdout());
        return Ok(());
    }

    let cfg = match config::Config::load() {
        Ok(c)  => c,
        Err(e) => {
            eprintln!("notistate: {:#}", e);
            process::exit(2);
        }
    };
    let store = NotificationStateStore::new(RedisCli::new(&cfg.redis), &cfg);

    let ok = match cli.command {
        Command::Set { key, ttl, remote_only } => run_set(&store, &parse_key(&key), ttl, remote_only),
        Command::Check { key, remote_only }    => run_check(&store, &parse_key(&key), remote_only),
        Command::Delete { key, remote_only }   => run_delete(&store, &parse_key(&key), remote_only),
        Command::List { pattern, json }        => run_list(&store, &pattern, json)?,
        Command::Reconcile { pattern }         => run_reconcile(&store, &pattern),
        Command::Ping                          => run_ping(&store, &cfg),
        Command::SelfTest                      => selftest::run(&store, &mut io::stdout())
                                                      .context("writing self-test report")?,
        Command::Config                        => run_print_config(&cfg),
        Command::Completions { .. }            => unreachable!("handled above"),
    };
    process::exit(if ok { 0 } else { 1 });
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("notistate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn parse_key(args: &KeyArgs) -> NotificationKey {
    match NotificationKey::new(&args.script, &args.device_class, &args.state) {
        Ok(k)  => k,
        Err(e) => {
            eprintln!("notistate: {}", e);
            process::exit(2);
        }
    }
}

fn run_set(store: &Store, key: &NotificationKey, ttl: Option<u64>, remote_only: bool) -> bool {
    if remote_only {
        return store.set_state(key, ttl).is_ok();
    }
    store.set_notification_state(key, ttl).is_ok()
}

fn run_check(store: &Store, key: &NotificationKey, remote_only: bool) -> bool {
    if remote_only {
        store.check_state(key)
    } else {
        store.check_notification_state(key)
    }
}

fn run_delete(store: &Store, key: &NotificationKey, remote_only: bool) -> bool {
    if remote_only {
        return store.delete_state(key).is_ok();
    }
    store.delete_notification_state(key).is_ok()
}

fn run_list(store: &Store, pattern: &str, json: bool) -> Result<bool> {
    let records = match store.list_states(pattern) {
        Ok(r)  => r,
        Err(_) => return Ok(false),
    };

    if json {
        let mut all: Vec<NotificationRecord> = Vec::new();
        for rec in records {
            match rec {
                Ok(r)  => all.push(r),
                Err(e) => tracing::warn!(error = %e, "skipping key"),
            }
        }
        println!("{}", serde_json::to_string_pretty(&all)?);
        return Ok(true);
    }

    let mut shown = 0usize;
    for rec in records {
        match rec {
            Ok(r) => {
                println!("{:<56} {:<19}  {}", r.key, r.set_at(), r.ttl.label());
                shown += 1;
            }
            Err(e) => tracing::warn!(error = %e, "skipping key"),
        }
    }
    if shown == 0 {
        println!("No notification states match {:?}.", pattern);
    }
    Ok(true)
}

fn run_reconcile(store: &Store, pattern: &str) -> bool {
    match store.reconcile_missing_ttl(pattern) {
        Ok(n) => {
            println!("Applied {}s TTL to {} key(s).", store.default_ttl(), n);
            true
        }
        Err(_) => false,
    }
}

fn run_ping(store: &Store, cfg: &config::Config) -> bool {
    let ok = store.probe_connectivity();
    println!(
        "redis {}:{} {}",
        cfg.redis.host, cfg.redis.port,
        if ok { "reachable" } else { "unreachable" }
    );
    ok
}

fn run_print_config(cfg: &config::Config) -> bool {
    let path = config::Config::config_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    let password = if cfg.redis.password.is_empty() { "(not set)" } else { "(configured)" };
    println!("Config: {}", path);
    println!();
    println!("[redis]");
    println!("  host         = {}", cfg.redis.host);
    println!("  port         = {}", cfg.redis.port);
    println!("  db           = {}", cfg.redis.db);
    println!("  password     = {}", password);
    println!("  timeout_secs = {}", cfg.redis.timeout_secs);
    println!();
    println!("[keys]");
    println!("  key_prefix       = {}", cfg.keys.key_prefix);
    println!("  default_ttl_secs = {}", cfg.keys.default_ttl_secs);
    println!();
    println!("[markers]");
    println!("  dir        = {}", cfg.markers.dir.display());
    println!("  app_prefix = {}", cfg.markers.app_prefix);
    true
}
