//! CAN Live Analyzer CLI Application
//!
//! This is the command-line interface for the live CAN analyzer.
//! It uses the can-live-analyzer library and adds:
//! - Argument parsing and an optional TOML configuration file
//! - Logging setup
//! - An interactive summary view of bus traffic
//! - A printer for the raw-frame live tap

use anyhow::{anyhow, Context, Result};
use can_live_analyzer::{Analyzer, AnalyzerConfig, FrameSource};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

mod config;
mod tap;
mod ui;

use config::{AppConfig, Overrides};

/// CAN Live Analyzer - Your friendly friend in CAN bus protocol analysis and reverse engineering
#[derive(Parser, Debug)]
#[command(name = "can-live-cli")]
#[command(about = "Analyze live CAN bus traffic for reverse engineering", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Write log output to this file
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Begin analysis of the CAN bus traffic from a given interface
    Analyze {
        /// CAN interface name (e.g. can0, vcan0)
        device: String,

        /// The maximum number of frame summary items to keep in memory
        #[arg(short = 'l', long, value_name = "COUNT", allow_negative_numbers = true)]
        frame_summary_limit: Option<i64>,

        /// How often the view refreshes, in milliseconds
        #[arg(short = 'i', long, value_name = "MS")]
        refresh_interval: Option<u64>,
    },

    /// Print frames from the live tap while traffic is being aggregated
    Tap {
        /// CAN interface name (e.g. can0, vcan0)
        device: String,

        /// Print one JSON object per frame instead of candump-style lines
        #[arg(long)]
        json: bool,

        /// Stop after printing this many frames
        #[arg(long, value_name = "COUNT")]
        max_frames: Option<usize>,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let file_config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };

    let overrides = match &args.command {
        Command::Analyze {
            frame_summary_limit,
            refresh_interval,
            ..
        } => Overrides {
            frame_summary_limit: *frame_summary_limit,
            refresh_interval_ms: *refresh_interval,
            log_file: args.log_file.clone(),
        },
        Command::Tap { .. } => Overrides {
            log_file: args.log_file.clone(),
            ..Overrides::default()
        },
    };
    let config = file_config.merge(overrides);

    // The summary view owns the terminal; without a log file its errors are
    // held back and written once the terminal has been restored
    let interactive = matches!(args.command, Command::Analyze { .. });
    let held_log = (interactive && config.logging.file.is_none()).then(HeldStderr::holding);
    init_logging(
        args.verbose,
        args.quiet,
        config.logging.file.as_deref(),
        held_log.clone(),
    )?;

    log::info!("CAN Live Analyzer CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using analyzer library v{}", can_live_analyzer::VERSION);

    match &args.command {
        Command::Analyze { device, .. } => {
            let result = analyze_mode(device, &config.analyzer);
            if let Some(held_log) = &held_log {
                held_log.release();
            }
            result
        }
        Command::Tap {
            device,
            json,
            max_frames,
        } => {
            let format = if *json {
                tap::TapFormat::Json
            } else {
                tap::TapFormat::Candump
            };
            tap_mode(device, &config.analyzer, format, *max_frames)
        }
    }
}

/// Interactive mode - aggregate traffic and show the summary view
fn analyze_mode(device: &str, config: &AnalyzerConfig) -> Result<()> {
    let source = open_source(device, config)?;
    let analyzer = Arc::new(Analyzer::new(source, config));
    let worker = spawn_ingestion(Arc::clone(&analyzer))?;

    let view = ui::AnalyzerUi::new(analyzer.store(), config);
    let view_result = view.run(|| worker.is_finished());
    log::debug!("Summary view exited");

    finish_ingestion(&analyzer, worker, device)?;
    view_result
}

/// Tap mode - aggregate traffic and print frames handed to the live tap
fn tap_mode(
    device: &str,
    config: &AnalyzerConfig,
    format: tap::TapFormat,
    max_frames: Option<usize>,
) -> Result<()> {
    let source = open_source(device, config)?;
    let analyzer = Arc::new(Analyzer::new(source, config));
    let frames = analyzer.frames();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;
    }

    let worker = spawn_ingestion(Arc::clone(&analyzer))?;

    let mut stdout = io::stdout().lock();
    let printed = tap::print_frames(&frames, device, format, max_frames, &mut stdout, || {
        interrupted.load(Ordering::SeqCst) || worker.is_finished()
    });

    finish_ingestion(&analyzer, worker, device)?;
    let printed = printed?;
    log::info!(
        "Printed {} frames; {} identifiers tracked",
        printed,
        analyzer.store().len()
    );
    Ok(())
}

fn spawn_ingestion(analyzer: Arc<Analyzer>) -> Result<JoinHandle<can_live_analyzer::Result<()>>> {
    thread::Builder::new()
        .name("can-ingest".to_string())
        .spawn(move || analyzer.run())
        .context("Failed to spawn ingestion thread")
}

/// Stop the analyzer and surface any transport error from its thread
fn finish_ingestion(
    analyzer: &Analyzer,
    worker: JoinHandle<can_live_analyzer::Result<()>>,
    device: &str,
) -> Result<()> {
    analyzer.stop().context("Failed to stop analyzer")?;

    worker
        .join()
        .map_err(|_| anyhow!("Ingestion thread panicked"))?
        .with_context(|| format!("Analyzer on {} exited", device))?;

    log::debug!("Quitting");
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_source(device: &str, config: &AnalyzerConfig) -> Result<Arc<dyn FrameSource>> {
    let source = can_live_analyzer::SocketCanSource::open(device, config.read_timeout())
        .with_context(|| format!("Failed to open CAN interface {}", device))?;
    Ok(Arc::new(source))
}

#[cfg(not(target_os = "linux"))]
fn open_source(device: &str, _config: &AnalyzerConfig) -> Result<Arc<dyn FrameSource>> {
    Err(anyhow!(
        "Cannot open {}: live capture requires SocketCAN, which is only available on Linux",
        device
    ))
}

/// Initialize logging based on verbosity level
///
/// With `held` set, only errors are logged and they go to stderr through the
/// held writer.
fn init_logging(
    verbose: u8,
    quiet: bool,
    log_file: Option<&Path>,
    held: Option<HeldStderr>,
) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;
    use std::fs::File;

    let mut level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = Builder::new();
    match (log_file, held) {
        (Some(path), _) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {:?}", path))?;
            builder.target(Target::Pipe(Box::new(file)));
        }
        (None, Some(held)) => {
            level = LevelFilter::Error;
            builder.target(Target::Pipe(Box::new(held)));
        }
        (None, None) => {}
    }

    builder
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    Ok(())
}

/// Log writer that buffers output until released, then writes to stderr
#[derive(Clone, Default)]
struct HeldStderr {
    state: Arc<Mutex<HeldState>>,
}

#[derive(Default)]
struct HeldState {
    released: bool,
    buffer: Vec<u8>,
}

impl HeldStderr {
    fn holding() -> Self {
        Self::default()
    }

    /// Flush everything held so far to stderr and pass later writes through
    fn release(&self) {
        let mut stderr = io::stderr().lock();
        if let Err(e) = self.release_into(&mut stderr) {
            eprintln!("Failed to write held log output: {}", e);
        }
    }

    fn release_into<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut state = self.state.lock();
        state.released = true;
        let held = std::mem::take(&mut state.buffer);
        out.write_all(&held)?;
        out.flush()
    }
}

impl Write for HeldStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.released {
            drop(state);
            io::stderr().write(buf)
        } else {
            state.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.state.lock().released {
            io::stderr().flush()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_analyze_arguments() {
        let args = Args::parse_from([
            "can-live-cli",
            "-vv",
            "analyze",
            "can0",
            "-l",
            "50",
            "-i",
            "250",
        ]);
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Analyze {
                device,
                frame_summary_limit,
                refresh_interval,
            } => {
                assert_eq!(device, "can0");
                assert_eq!(frame_summary_limit, Some(50));
                assert_eq!(refresh_interval, Some(250));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_held_log_output_waits_for_release() {
        let mut held = HeldStderr::holding();
        writeln!(held, "[ERROR can_live_analyzer] bus went away").unwrap();
        writeln!(held, "[ERROR can_live_analyzer] second").unwrap();

        let mut out = Vec::new();
        held.release_into(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[ERROR can_live_analyzer] bus went away\n[ERROR can_live_analyzer] second\n"
        );

        // Nothing is buffered twice
        let mut again = Vec::new();
        held.release_into(&mut again).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_tap_arguments() {
        let args = Args::parse_from([
            "can-live-cli",
            "tap",
            "vcan0",
            "--json",
            "--max-frames",
            "10",
        ]);
        match args.command {
            Command::Tap { device, json, max_frames } => {
                assert_eq!(device, "vcan0");
                assert!(json);
                assert_eq!(max_frames, Some(10));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
