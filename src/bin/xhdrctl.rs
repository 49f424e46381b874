//! xhdrctl - command line client for the XHDR extension
//!
//! ```text
//! xhdrctl query <screen> [--json]
//! xhdrctl set <window> <primaries> <eotf> <max_cll> <min_lum> <max_lum>
//! ```
//!
//! Numbers accept a `0x` prefix for hex.

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xhdr::XhdrClient;
use xhdr_proto::HdrMetadata;

const USAGE: &str = "usage:
  xhdrctl query <screen> [--json]
  xhdrctl set <window> <primaries> <eotf> <max_cll> <min_lum> <max_lum>";

fn parse_u32(arg: &str) -> Result<u32> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.with_context(|| format!("Invalid number: {}", arg))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|arg| arg == "--json");
    let positional: Vec<&str> = args
        .iter()
        .filter(|arg| !arg.starts_with("--"))
        .map(String::as_str)
        .collect();

    match positional.as_slice() {
        ["query", screen] => {
            let screen = parse_u32(screen)?;
            let mut client = XhdrClient::connect().context("Failed to connect to XHDR server")?;
            let record = client.query_hdr_capabilities(screen)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("screen {}", screen);
                println!("  supported: {}", record.supported);
                println!("  max depth: {} bpc", record.max_depth);
                println!("  eotfs:     {:?}", record.eotfs);
            }
        }
        ["set", window, primaries, eotf, max_cll, min_lum, max_lum] => {
            let window = parse_u32(window)?;
            let metadata = HdrMetadata {
                primaries: parse_u32(primaries)?,
                eotf: parse_u32(eotf)?,
                max_cll: parse_u32(max_cll)?,
                min_lum: parse_u32(min_lum)?,
                max_lum: parse_u32(max_lum)?,
            };
            let mut client = XhdrClient::connect().context("Failed to connect to XHDR server")?;
            client.set_hdr_metadata(window, metadata)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("window {:#x}: metadata set", window);
            }
        }
        _ => bail!("{}", USAGE),
    }

    Ok(())
}
