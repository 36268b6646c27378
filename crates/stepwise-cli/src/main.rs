//! Stepwise Command-Line Interface
//!
//! This CLI provides tools for:
//! - Running one uplink over the simulated radio, tick by tick
//! - Encoding sensor readings into a 12-byte uplink payload
//! - Decoding a payload back into readings
//! - Printing the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stepwise_core::clock::{Clock, ManualClock, SystemClock};
use stepwise_core::config::StepwiseConfig;
use stepwise_core::message::{self, Message};
use stepwise_core::protocol::{uplink, UplinkContext};
use stepwise_core::{Driver, Engine, Outcome, SimulatedTransceiver};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stepwise")]
#[command(author, version, about = "Resumable uplink driver", long_about = None)]
struct Cli {
    /// Enable verbose output (-vv shows frame transitions with --trace-frames)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send readings over the simulated radio and wait for a downlink
    Run {
        /// Readings as name=value pairs, e.g. "tmp=21.5,hum=60,sta=ok"
        #[arg(short, long)]
        message: String,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for the simulated radio
        #[arg(long)]
        seed: Option<u64>,

        /// Probability that a poll yields a downlink (0.0 - 1.0)
        #[arg(long)]
        downlink_probability: Option<f64>,

        /// Probability that a send fails (0.0 - 1.0)
        #[arg(long)]
        send_failure_rate: Option<f64>,

        /// Downlink timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Succeed even when no downlink arrives
        #[arg(long)]
        optional_downlink: bool,

        /// Give up after this many ticks (0 = no limit)
        #[arg(long)]
        max_ticks: Option<u64>,

        /// Log every frame transition at debug level
        #[arg(long)]
        trace_frames: bool,

        /// Skip real sleeps and advance a virtual clock instead
        #[arg(long)]
        virtual_time: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Encode readings into an uplink payload
    Encode {
        /// Readings as name=value pairs
        #[arg(short, long)]
        message: String,
    },

    /// Decode an uplink payload given as hex
    Decode {
        /// Payload hex, e.g. 10a2d700
        hex: String,
    },

    /// Print the effective configuration as JSON
    Config {
        /// JSON configuration file to merge over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

struct RunOptions {
    message: String,
    seed: Option<u64>,
    downlink_probability: Option<f64>,
    send_failure_rate: Option<f64>,
    timeout_ms: Option<u64>,
    optional_downlink: bool,
    max_ticks: Option<u64>,
    trace_frames: bool,
    virtual_time: bool,
    json: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<StepwiseConfig> {
    match path {
        Some(path) => StepwiseConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(StepwiseConfig::default()),
    }
}

fn apply_overrides(mut config: StepwiseConfig, opts: &RunOptions) -> StepwiseConfig {
    if let Some(seed) = opts.seed {
        config.radio = config.radio.seed(seed);
    }
    if let Some(p) = opts.downlink_probability {
        config.radio = config.radio.downlink_probability(p);
    }
    if let Some(p) = opts.send_failure_rate {
        config.radio = config.radio.send_failure_rate(p);
    }
    if let Some(ms) = opts.timeout_ms {
        config.uplink = config.uplink.downlink_timeout_ms(ms);
    }
    if opts.optional_downlink {
        config.uplink = config.uplink.downlink_required(false);
    }
    if let Some(ticks) = opts.max_ticks {
        config.driver = config.driver.max_ticks(ticks);
    }
    if opts.trace_frames {
        config.engine = config.engine.trace_frames(true);
    }
    config
}

fn cmd_run(config_path: Option<PathBuf>, opts: RunOptions) -> Result<()> {
    let config = apply_overrides(load_config(config_path.as_ref())?, &opts);

    let message = Message::parse_fields(&opts.message)
        .map_err(|e| anyhow::anyhow!("Invalid message '{}': {}", opts.message, e))?;
    let radio = SimulatedTransceiver::new(config.radio.clone());
    let ctx = UplinkContext::new(radio, &message, config.uplink.clone())
        .map_err(|e| anyhow::anyhow!("Cannot send message: {}", e))?;

    // Setup Ctrl+C handler
    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        s.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    if !opts.json {
        println!("=== Uplink ===");
        println!();
        println!("Payload:  {} ({} bytes)", message.to_hex(), message.len());
        println!("Timeout:  {} ms", config.uplink.downlink_timeout_ms);
        println!(
            "Downlink: {}",
            if config.uplink.downlink_required { "required" } else { "optional" }
        );
        println!();
    }

    if opts.virtual_time {
        let engine = Engine::with_clock(config.engine.clone(), ManualClock::new(0));
        drive(engine, &config, ctx, &stop, opts.json)
    } else {
        let engine = Engine::with_clock(config.engine.clone(), SystemClock::new());
        drive(engine, &config, ctx, &stop, opts.json)
    }
}

fn drive<C: Clock>(
    engine: Engine<C>,
    config: &StepwiseConfig,
    mut ctx: UplinkContext<SimulatedTransceiver>,
    stop: &AtomicBool,
    json: bool,
) -> Result<()> {
    let mut driver = Driver::new(engine, config.driver.clone());
    info!("Starting uplink");
    let result = driver.run(|engine| uplink(engine, &mut ctx), Some(stop));

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            warn!("Uplink aborted: {}", e);
            for frame in driver.engine().chain() {
                warn!(
                    "  {}{} at step {}",
                    "  ".repeat(frame.depth),
                    frame.name,
                    frame.current_step
                );
            }
            return Err(e).context("Uplink did not complete");
        }
    };

    let downlink = ctx.downlink_text();
    if json {
        let report = serde_json::json!({
            "summary": summary,
            "sent": ctx.radio.sent().len(),
            "downlink": downlink,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("=== Result ===");
        println!();
        println!(
            "Outcome:  {}",
            if summary.outcome == Outcome::Succeeded { "success" } else { "failure" }
        );
        println!("Ticks:    {}", summary.ticks);
        println!("Elapsed:  {} ms", summary.elapsed_ms);
        println!("Sent:     {} frame(s)", ctx.radio.sent().len());
        println!("Downlink: {}", downlink.as_deref().unwrap_or("(none)"));
    }

    if summary.outcome == Outcome::Failed {
        anyhow::bail!("Uplink failed");
    }
    Ok(())
}

fn cmd_encode(fields: String) -> Result<()> {
    let message = Message::parse_fields(&fields)
        .map_err(|e| anyhow::anyhow!("Invalid message '{}': {}", fields, e))?;
    let frame = message
        .frame()
        .map_err(|e| anyhow::anyhow!("Cannot encode: {}", e))?;

    println!("Hex:    {}", message::to_hex(&frame));
    println!("Bytes:  {}", frame.len());
    println!("Fields: {}", message::render(&message::decode(&frame)?));
    Ok(())
}

fn cmd_decode(hex: String) -> Result<()> {
    let fields = message::decode_hex(&hex)
        .map_err(|e| anyhow::anyhow!("Cannot decode '{}': {}", hex, e))?;
    println!("{}", message::render(&fields));
    Ok(())
}

fn cmd_config(path: Option<PathBuf>) -> Result<()> {
    let config = load_config(path.as_ref())?;
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            message,
            config,
            seed,
            downlink_probability,
            send_failure_rate,
            timeout_ms,
            optional_downlink,
            max_ticks,
            trace_frames,
            virtual_time,
            json,
        } => cmd_run(
            config,
            RunOptions {
                message,
                seed,
                downlink_probability,
                send_failure_rate,
                timeout_ms,
                optional_downlink,
                max_ticks,
                trace_frames,
                virtual_time,
                json,
            },
        ),

        Commands::Encode { message } => cmd_encode(message),

        Commands::Decode { hex } => cmd_decode(hex),

        Commands::Config { config } => cmd_config(config),
    }
}
