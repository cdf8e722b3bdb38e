//! Command-line client for a Kyoto Tycoon style key-value server.
//!
//! Every client operation is exposed as a subcommand; results print as plain
//! text or, with `--json`, as one JSON value per invocation.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kt_client::{ClientConfig, KtClient};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// kt CLI
#[derive(Parser, Debug)]
#[command(name = "kt")]
#[command(about = "CLI for Kyoto Tycoon style key-value servers")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server HTTP port
    #[arg(short, long, default_value_t = 1978)]
    port: u16,

    /// Maximum pooled connections
    #[arg(long, default_value_t = 5)]
    pool_size: usize,

    /// Seconds to wait for a pooled connection
    #[arg(long, default_value = "5", value_parser = parse_secs)]
    timeout: Duration,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Number of records in the database
    Count,

    /// Remove every record
    Clear,

    /// Collect expired records
    Vacuum,

    /// Get a value by key
    Get {
        key: String,

        /// Fail when the key is missing
        #[arg(long)]
        strict: bool,
    },

    /// Set a value through the RPC interface
    Set {
        key: String,
        value: String,

        /// Expire the record after this many seconds
        #[arg(long, value_parser = parse_secs)]
        expire: Option<Duration>,
    },

    /// Set a value through the REST interface
    Put { key: String, value: String },

    /// Delete a key
    Remove {
        key: String,

        /// Fail when the key is missing
        #[arg(long)]
        strict: bool,
    },

    /// Get several keys at once
    GetBulk {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Set several KEY=VALUE pairs at once
    SetBulk {
        #[arg(required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },

    /// Delete several keys at once
    RemoveBulk {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List keys starting with a prefix
    MatchPrefix {
        prefix: String,

        /// Maximum number of keys (all when omitted)
        #[arg(long)]
        max: Option<usize>,
    },

    /// Compare-and-swap
    Cas {
        key: String,

        /// Expected current value (omit to require an absent key)
        #[arg(long)]
        old: Option<String>,

        /// Replacement value (omit to delete)
        #[arg(long)]
        new: Option<String>,

        /// Fail when the precondition does not hold
        #[arg(long)]
        strict: bool,
    },

    /// Remaining time to live in seconds (-1 no expiry, -2 missing)
    Ttl { key: String },

    /// Remaining time to live in milliseconds (-1 no expiry, -2 missing)
    Pttl { key: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        host: args.host.clone(),
        port: args.port,
        pool_size: args.pool_size,
        timeout: args.timeout,
        ..ClientConfig::default()
    };
    debug!(?config, "connecting");
    let client = KtClient::with_config(config).context("invalid client configuration")?;

    let output = run(&client, args.command)?;
    println!("{}", if args.json { render_json(output) } else { render_text(output) });
    Ok(())
}

/// Result of one subcommand.
#[derive(Debug)]
enum Output {
    Done,
    Number(i64),
    Flag(bool),
    Value(Option<Vec<u8>>),
    Map(HashMap<Vec<u8>, Vec<u8>>),
    Keys(Vec<Vec<u8>>),
}

fn run(client: &KtClient, command: Commands) -> Result<Output> {
    let output = match command {
        Commands::Count => Output::Number(count_to_i64(client.count()?)),
        Commands::Clear => {
            client.clear()?;
            Output::Done
        }
        Commands::Vacuum => {
            client.vacuum()?;
            Output::Done
        }
        Commands::Get { key, strict: false } => Output::Value(client.get(key.as_bytes())?),
        Commands::Get { key, strict: true } => {
            Output::Value(Some(client.get_strict(key.as_bytes())?))
        }
        Commands::Set { key, value, expire } => {
            match expire {
                Some(expire) => client.set_with_expiry(key.as_bytes(), value.as_bytes(), expire)?,
                None => client.set(key.as_bytes(), value.as_bytes())?,
            }
            Output::Done
        }
        Commands::Put { key, value } => {
            client.put(key.as_bytes(), value.as_bytes())?;
            Output::Done
        }
        Commands::Remove { key, strict: false } => Output::Flag(client.remove(key.as_bytes())?),
        Commands::Remove { key, strict: true } => {
            client.remove_strict(key.as_bytes())?;
            Output::Flag(true)
        }
        Commands::GetBulk { keys } => Output::Map(client.get_bulk(&keys)?),
        Commands::SetBulk { pairs } => Output::Number(count_to_i64(client.set_bulk(pairs)?)),
        Commands::RemoveBulk { keys } => Output::Number(count_to_i64(client.remove_bulk(&keys)?)),
        Commands::MatchPrefix { prefix, max } => {
            Output::Keys(client.match_prefix(prefix.as_bytes(), max)?)
        }
        Commands::Cas {
            key,
            old,
            new,
            strict,
        } => {
            let old = old.as_deref().map(str::as_bytes);
            let new = new.as_deref().map(str::as_bytes);
            if strict {
                client.cas_strict(key.as_bytes(), old, new)?;
                Output::Flag(true)
            } else {
                Output::Flag(client.cas(key.as_bytes(), old, new)?)
            }
        }
        Commands::Ttl { key } => Output::Number(client.ttl(key.as_bytes())?),
        Commands::Pttl { key } => Output::Number(client.pttl(key.as_bytes())?),
    };
    Ok(output)
}

fn count_to_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn render_text(output: Output) -> String {
    match output {
        Output::Done => "OK".to_string(),
        Output::Number(n) => n.to_string(),
        Output::Flag(flag) => flag.to_string(),
        Output::Value(Some(value)) => lossy(&value),
        Output::Value(None) => "(nil)".to_string(),
        Output::Map(map) => {
            let mut lines: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{}\t{}", lossy(key), lossy(value)))
                .collect();
            lines.sort();
            lines.join("\n")
        }
        Output::Keys(keys) => keys
            .iter()
            .map(|key| lossy(key))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn render_json(output: Output) -> String {
    let value = match output {
        Output::Done => json!("OK"),
        Output::Number(n) => json!(n),
        Output::Flag(flag) => json!(flag),
        Output::Value(value) => value.map_or(Value::Null, |value| json!(lossy(&value))),
        Output::Map(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (lossy(key), json!(lossy(value))))
                .collect(),
        ),
        Output::Keys(keys) => json!(keys.iter().map(|key| lossy(key)).collect::<Vec<_>>()),
    };
    value.to_string()
}

fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("{raw:?} is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|err| format!("{raw:?}: {err}"))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("{raw:?} is not KEY=VALUE"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_and_defaults() {
        let args = Args::try_parse_from(["kt", "count"]).unwrap();
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 1978);
        assert_eq!(args.pool_size, 5);
        assert_eq!(args.timeout, Duration::from_secs(5));

        let args = Args::try_parse_from([
            "kt", "--host", "kt.local", "-p", "2000", "--timeout", "0.5", "--json", "ttl", "k",
        ])
        .unwrap();
        assert_eq!(args.host, "kt.local");
        assert_eq!(args.port, 2000);
        assert_eq!(args.timeout, Duration::from_millis(500));
        assert!(args.json);
        assert!(matches!(args.command, Commands::Ttl { ref key } if key == "k"));
    }

    #[test]
    fn parses_bulk_pairs() {
        let args = Args::try_parse_from(["kt", "set-bulk", "japan=tokyo", "eq=a=b"]).unwrap();
        match args.command {
            Commands::SetBulk { pairs } => assert_eq!(
                pairs,
                vec![
                    ("japan".to_string(), "tokyo".to_string()),
                    ("eq".to_string(), "a=b".to_string()),
                ]
            ),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Args::try_parse_from(["kt", "set-bulk", "novalue"]).is_err());
    }

    #[test]
    fn parses_cas_options() {
        let args = Args::try_parse_from(["kt", "cas", "k", "--new", "v"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Cas { ref old, ref new, strict: false, .. } if old.is_none() && new.as_deref() == Some("v")
        ));
    }

    #[test]
    fn rejects_negative_durations() {
        assert!(parse_secs("-1").is_err());
        assert!(parse_secs("soon").is_err());
        assert_eq!(parse_secs("1.5").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn renders_text_and_json() {
        assert_eq!(render_text(Output::Value(None)), "(nil)");
        assert_eq!(render_json(Output::Value(None)), "null");
        assert_eq!(render_text(Output::Number(-2)), "-2");

        let keys = Output::Keys(vec![b"user:1".to_vec(), b"user:2".to_vec()]);
        assert_eq!(render_json(keys), r#"["user:1","user:2"]"#);

        let map: HashMap<Vec<u8>, Vec<u8>> =
            [(b"b".to_vec(), b"2".to_vec()), (b"a".to_vec(), b"1".to_vec())]
                .into_iter()
                .collect();
        assert_eq!(render_text(Output::Map(map)), "a\t1\nb\t2");
    }
}
