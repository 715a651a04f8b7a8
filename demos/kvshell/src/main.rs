use anyhow::{bail, Context, Result};
use clap::Parser;
use durakv::{types, Consistency, Store, StoreConfig};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kvshell")]
#[command(about = "Interactive shell over a durakv store", long_about = None)]
struct Cli {
    /// Data directory holding the WAL and snapshot
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Read consistency: strong or eventual
    #[arg(short, long, default_value = "strong")]
    consistency: Consistency,

    /// Entry lifetime in seconds; omit to disable expiry
    #[arg(short, long)]
    ttl: Option<f64>,

    /// Read delay in milliseconds for eventual consistency
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
}

enum Command {
    Put(String, String),
    Get(String),
    Delete(String),
    Conflict(String, String, String),
    List,
    Status,
    Help,
    Exit,
}

impl Command {
    fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };
        if name.is_empty() {
            bail!("empty command");
        }
        let command = match (name, split_args(rest)) {
            // Keys are single words; the last value takes the rest of the line
            ("put", [Some(key), Some(value), ..]) => {
                Self::Put(key.to_string(), value.to_string())
            }
            ("get", [Some(_), ..]) => Self::Get(rest.to_string()),
            ("delete" | "del", [Some(_), ..]) => Self::Delete(rest.to_string()),
            ("conflict", [Some(key), Some(values)]) => match values.split_once(char::is_whitespace) {
                Some((first, second)) if !second.trim().is_empty() => Self::Conflict(
                    key.to_string(),
                    first.to_string(),
                    second.trim_start().to_string(),
                ),
                _ => bail!("usage: conflict <key> <first> <second>"),
            },
            ("list", [None, None]) => Self::List,
            ("status", [None, None]) => Self::Status,
            ("help", [None, None]) => Self::Help,
            ("exit" | "quit", [None, None]) => Self::Exit,
            _ => bail!("invalid command: {line} (try `help`)"),
        };
        Ok(command)
    }
}

/// Split into the first word and the remainder of the line
fn split_args(rest: &str) -> [Option<&str>; 2] {
    if rest.is_empty() {
        return [None, None];
    }
    match rest.split_once(char::is_whitespace) {
        Some((first, tail)) if !tail.trim().is_empty() => [Some(first), Some(tail.trim_start())],
        _ => [Some(rest), None],
    }
}

const HELP: &str = "\
commands:
  put <key> <value>
  get <key>
  delete <key>
  conflict <key> <first> <second>   resolve two writes one second apart
  list
  status
  exit";

/// Returns false when the shell should stop
fn run_command(store: &Store, command: Command) -> Result<bool> {
    match command {
        Command::Put(key, value) => {
            let entry = store.put(key.as_str(), value.as_str())?;
            println!("Stored ({key}, {value}) at version {}", entry.version);
        }
        Command::Get(key) => match store.get(&key)? {
            Some(value) => println!("Value: {value}"),
            None => println!("Key not found or expired."),
        },
        Command::Delete(key) => {
            store.delete(&key)?;
            println!("Deleted key: {key}");
        }
        Command::Conflict(key, first, second) => {
            let t1 = types::now();
            let t2 = t1 + 1.0;
            store.resolve_conflict(&key, first, 1, t1)?;
            store.resolve_conflict(&key, second, 2, t2)?;
            match store.get(&key)? {
                Some(value) => println!("After conflict resolution, {key} = {value}"),
                None => println!("After conflict resolution, {key} is absent"),
            }
        }
        Command::List => {
            let entries = store.entries();
            if entries.is_empty() {
                println!("Store is empty or keys expired.");
            }
            for (key, entry) in entries {
                println!(
                    "{key}\t{}\tv{}\t{}",
                    entry.value, entry.version, entry.timestamp
                );
            }
        }
        Command::Status => {
            println!("{:#?}", store.status());
        }
        Command::Help => println!("{HELP}"),
        Command::Exit => return Ok(false),
    }
    Ok(true)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ttl = match cli.ttl {
        Some(secs) if secs > 0.0 => Some(
            Duration::try_from_secs_f64(secs).context("TTL out of range")?,
        ),
        Some(_) => bail!("TTL must be positive"),
        None => None,
    };
    let config = StoreConfig::new(&cli.data_dir)
        .with_consistency(cli.consistency)
        .with_ttl(ttl)
        .with_read_delay(Duration::from_millis(cli.delay_ms));
    let store = Store::open(config)?;
    info!("kvshell ready on {:?}", cli.data_dir);

    println!("{HELP}");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match Command::parse(&line) {
            Ok(command) => {
                if !run_command(&store, command)? {
                    break;
                }
            }
            Err(err) => println!("{err}"),
        }
    }
    println!("Bye!");
    Ok(())
}
