use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;

use clap::{Args, Subcommand};
use streamframe_conn::ConnectionConfig;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every frame back to its sender.
    Echo(EchoArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Accept connections and print received frames.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub format: OutputFormat,
    pub max_frame_size: usize,
}

impl Context {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default().with_max_payload_size(self.max_frame_size)
    }
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        Command::Listen(args) => listen::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (e.g. 127.0.0.1:7000).
    pub addr: String,
    /// Only echo these command ids (comma-separated). Default: all.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub commands: Option<Vec<i32>>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to.
    pub addr: String,
    /// Command id carried in the frame prefix.
    #[arg(long, short = 'c', default_value = "1", allow_negative_numbers = true)]
    pub command: i32,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one reply frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (e.g. 127.0.0.1:7000).
    pub addr: String,
    /// Only print these command ids (comma-separated).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub commands: Option<Vec<i32>>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Why a long-running command stopped.
#[derive(Debug)]
pub enum Stop {
    Done,
    Failed(CliError),
}

/// Route Ctrl-C into the command's stop channel.
pub fn install_ctrlc_handler(stop: Sender<Stop>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = stop.send(Stop::Done);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn accepts_command(filter: Option<&[i32]>, command: i32) -> bool {
    filter.is_none_or(|commands| commands.contains(&command))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
