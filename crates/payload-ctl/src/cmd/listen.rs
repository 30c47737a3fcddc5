//! Downlink monitor and ID table listing.

use anyhow::Result;
use serde::Serialize;

use payload_core::message_id;

use super::link::{open, print_message, Options};

/// Print every message the payload sends until ctrl-c.
pub async fn cmd_listen(opts: &Options) -> Result<()> {
    let mut transport = open(opts)?;
    if !opts.json {
        println!("listening on {} (ctrl-c to stop)", opts.device.display());
    }
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            r = transport.poll_receive(opts.timeout) => match r {
                Ok(Some(message)) => print_message(&message, opts.json)?,
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "receive failed"),
            }
        }
    }
}

#[derive(Serialize)]
struct IdEntry {
    id: u8,
    name: &'static str,
}

pub fn cmd_ids(json: bool) -> Result<()> {
    let entries: Vec<IdEntry> = message_id::ALL
        .iter()
        .map(|&id| IdEntry {
            id,
            name: message_id::name(id),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Message IDs ({})", entries.len());
    println!("═══════════════════════════════════════");
    for e in &entries {
        println!("  0x{:02x}  {}", e.id, e.name);
    }
    Ok(())
}
