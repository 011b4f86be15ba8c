//! Mochi VT - feed a byte stream through the engine and print the result
//!
//! Reads terminal output from a file (or stdin), runs it through the parser
//! and buffer, and prints the final state as a JSON snapshot, plain text or
//! a full ANSI render.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mochi_vt::app::{self, Config, ConfigError};
use mochi_vt::core::{Snapshot, Theme};
use mochi_vt::renderer::{Chrome, DiffRenderer, FrameSnapshot};
use mochi_vt::terminal::Terminal;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Snapshot of grid, cursor, modes and overlays
    Json,
    /// Screen text, one line per row
    Text,
    /// Escape sequences that redraw the final screen
    Ansi,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeArg {
    Dark,
    Light,
}

#[derive(Debug, Parser)]
#[command(name = "mochi-vt")]
#[command(version)]
#[command(about = "Run a byte stream through the terminal engine", long_about = None)]
struct Args {
    /// Input file; reads stdin when absent or `-`
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Configuration file (defaults to ~/.config/mochi-vt/config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "COLS")]
    cols: Option<usize>,

    #[arg(long, value_name = "ROWS")]
    rows: Option<usize>,

    /// Maximum scrollback lines
    #[arg(long, value_name = "LINES")]
    scrollback: Option<usize>,

    #[arg(short, long, value_enum)]
    theme: Option<ThemeArg>,

    /// Feed the input in chunks of this many bytes
    #[arg(long, value_name = "BYTES")]
    chunk: Option<usize>,

    /// Draw a border with a status line around the ANSI render
    #[arg(long)]
    border: bool,
}

fn load_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    if let Some(cols) = args.cols {
        config.cols = cols;
    }
    if let Some(rows) = args.rows {
        config.rows = rows;
    }
    if let Some(lines) = args.scrollback {
        config.scrollback_lines = lines;
    }
    if let Some(theme) = args.theme {
        config.theme = match theme {
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Light => Theme::Light,
        };
    }
    config.validate()?;
    Ok(config)
}

fn read_input(path: Option<&PathBuf>) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    match path {
        Some(path) if path.as_os_str() != "-" => {
            data = std::fs::read(path)?;
        }
        _ => {
            io::stdin().read_to_end(&mut data)?;
        }
    }
    Ok(data)
}

fn render(terminal: &Terminal, format: Format, border: bool) -> Result<String, serde_json::Error> {
    let buffer = terminal.buffer();
    match format {
        Format::Json => Snapshot::from_buffer(buffer).to_json(),
        Format::Text => Ok(buffer.screen_text()),
        Format::Ansi => {
            let frame = FrameSnapshot::capture(buffer);
            if !border {
                return Ok(DiffRenderer::render_full(&frame));
            }
            let mut out = String::new();
            Chrome::default().render(&mut out, &frame, 1, 1);
            let mut renderer = DiffRenderer::new();
            renderer.set_origin(1, 1);
            out.push_str(&renderer.render(&frame));
            Ok(out)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            if args.config.is_none() {
                if let Some(path) = app::default_path() {
                    eprintln!("(default config location: {})", path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    let input = match read_input(args.input.as_ref()) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read input: {}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!(bytes = input.len(), cols = config.cols, rows = config.rows, "processing input");

    let mut terminal = config.build_terminal();
    match args.chunk {
        Some(size) if size > 0 => input.chunks(size).for_each(|chunk| terminal.process(chunk)),
        _ => terminal.process(&input),
    }

    let output = match render(&terminal, args.format, args.border) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Failed to serialize snapshot: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = io::stdout().lock();
    let written = stdout
        .write_all(output.as_bytes())
        .and_then(|()| stdout.write_all(b"\n"))
        .and_then(|()| stdout.flush());
    if let Err(e) = written {
        eprintln!("Failed to write output: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
