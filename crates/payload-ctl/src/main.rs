//! payload-ctl — ground-side command line for the payload link.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use payload_core::config::PayloadConfig;

mod cmd;

use cmd::link::Options;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

fn print_usage() {
    println!("Usage: payload-ctl [options] <command>");
    println!();
    println!("Commands:");
    println!("  send <id> [hex]      Send a command, do not wait for a reply");
    println!("  request <id> [hex]   Send a command and print the first reply");
    println!("  state                Request and print the payload state");
    println!("  time                 Request the payload clock and show drift");
    println!("  sync-time            Set the payload clock to ground time");
    println!("  listen               Print every downlinked message");
    println!("  ids                  List known message IDs");
    println!();
    println!("  <id> is hex (0x20), decimal (32) or a name (request_payload_state).");
    println!();
    println!("Options:");
    println!("  --device <path>   Serial device (default: from config)");
    println!("  --baud <rate>     Baud rate (default: from config)");
    println!("  --timeout <secs>  Reply timeout (default: {})", DEFAULT_TIMEOUT_SECS);
    println!("  --json            Machine-readable output");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = PayloadConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PayloadConfig::default()
    });

    let mut device: Option<PathBuf> = None;
    let mut baud: Option<u32> = None;
    let mut timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
    let mut json = false;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--device" => {
                i += 1;
                device = Some(PathBuf::from(
                    args.get(i).context("--device requires a value")?,
                ));
            }
            "--baud" => {
                i += 1;
                baud = Some(
                    args.get(i)
                        .context("--baud requires a value")?
                        .parse()
                        .context("--baud must be a number")?,
                );
            }
            "--timeout" => {
                i += 1;
                let secs: u64 = args
                    .get(i)
                    .context("--timeout requires a value")?
                    .parse()
                    .context("--timeout must be a number of seconds")?;
                timeout = Duration::from_secs(secs);
            }
            "--json" => json = true,
            other => remaining.push(other),
        }
        i += 1;
    }

    let opts = Options {
        device: device.unwrap_or_else(|| config.link.device.clone()),
        baud: baud.unwrap_or(config.link.baud_rate),
        timeout,
        json,
        config,
    };

    match remaining.as_slice() {
        ["send", id]                   => cmd::command::cmd_send(&opts, id, None).await,
        ["send", id, payload]          => cmd::command::cmd_send(&opts, id, Some(*payload)).await,
        ["request", id]                => cmd::command::cmd_request(&opts, id, None).await,
        ["request", id, payload]       => cmd::command::cmd_request(&opts, id, Some(*payload)).await,
        ["state"]                      => cmd::command::cmd_state(&opts).await,
        ["time"]                       => cmd::command::cmd_time(&opts).await,
        ["sync-time"]                  => cmd::command::cmd_sync_time(&opts).await,
        ["listen"]                     => cmd::listen::cmd_listen(&opts).await,
        ["ids"]                        => cmd::listen::cmd_ids(opts.json),
        ["help"] | ["--help"] | ["-h"] | [] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
