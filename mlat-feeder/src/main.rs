//! mlat-feeder: replay raw receiver captures through the decoder.
//!
//! Reads a file of raw receiver bytes (Beast/Radarcape binary, AVR text,
//! or SBS binary), feeds it through a [`mlat_core::Reader`] in chunks the
//! way a network client would, and prints the decoded messages.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mlat_core::{DecoderMode, Message, Reader};

#[derive(Parser)]
#[command(name = "mlat-feeder", version, about = "Mode S capture replay and decode")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a raw capture file into messages
    Decode(DecodeArgs),
}

#[derive(Args)]
struct DecodeArgs {
    /// Path to the capture file
    file: PathBuf,

    /// Wire format: beast, radarcape, radarcape_emulated, avr, avrmlat, sbs
    #[arg(short, long)]
    format: String,

    /// Feed chunk size in bytes
    #[arg(long, default_value = "4096")]
    chunk: usize,

    /// Print messages as JSON lines
    #[arg(long)]
    json: bool,

    /// Suppress metadata events
    #[arg(long)]
    no_events: bool,

    /// Include messages that fail CRC or length checks
    #[arg(long)]
    invalid: bool,

    /// Include synthetic mlat result messages
    #[arg(long)]
    mlat: bool,

    /// Include zero-timestamp messages
    #[arg(long)]
    zero: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Decode(args) => cmd_decode(args),
    }
}

fn cmd_decode(args: DecodeArgs) -> ExitCode {
    let mode = match args.format.to_uppercase().parse::<DecoderMode>() {
        Ok(mode) => mode,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let data = match std::fs::read(&args.file) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!("cannot read {}: {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "decoding {} ({} bytes) as {}",
        args.file.display(),
        data.len(),
        mode
    );

    let mut reader = Reader::new(Some(mode));
    reader.config.want_events = !args.no_events;
    reader.config.want_invalid_messages = args.invalid;
    reader.config.want_mlat_messages = args.mlat;
    reader.config.want_zero_timestamps = args.zero;
    reader.seen = Some(HashSet::new());

    let mut chunk = args.chunk.max(1);
    let mut start = 0usize;
    loop {
        let end = data.len().min(start + chunk);
        let result = match reader.feed(&data[start..end], 0) {
            Ok(result) => result,
            Err(e) if e.is_framing() => {
                tracing::error!("giving up at byte {start}: {e}");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
        };

        for msg in &result.messages {
            emit(msg, args.json);
        }

        start += result.consumed;

        if result.error_pending {
            // the next feed on the residual window surfaces the error
            continue;
        }

        if end == data.len() {
            if start < end {
                tracing::warn!("{} trailing bytes form an incomplete record", end - start);
            }
            break;
        }

        if result.consumed == 0 {
            // a record larger than the window, widen it
            chunk *= 2;
        }
    }

    tracing::info!(
        "done: {} received, {} suppressed, {} mlat, {} aircraft seen, last timestamp {}",
        reader.received_messages,
        reader.suppressed_messages,
        reader.mlat_messages,
        reader.seen.as_ref().map_or(0, HashSet::len),
        reader.last_timestamp()
    );

    ExitCode::SUCCESS
}

fn emit(msg: &Message, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(msg) {
            println!("{line}");
        }
        return;
    }

    match &msg.eventdata {
        Some(event) => println!("{:>14} event {:?}", msg.timestamp, event),
        None => {
            let mut line = format!("{:>14} df{:<2} {}", msg.timestamp, msg.df, msg);
            if let Some(address) = msg.address {
                line.push_str(&format!(" addr={address:06x}"));
            }
            if let Some(altitude) = msg.altitude {
                line.push_str(&format!(" alt={altitude}ft"));
            }
            if msg.signal != 0 {
                line.push_str(&format!(" rssi={}", msg.signal));
            }
            if !msg.valid {
                line.push_str(" (invalid)");
            }
            println!("{line}");
        }
    }
}
