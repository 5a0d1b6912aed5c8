use clap::{Args, Subcommand, ValueEnum};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod seal;
pub mod verify;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a session against a device and print stamped frames.
    Watch(WatchArgs),
    /// Append a crc check value to a payload and print the frame as hex.
    Seal(SealArgs),
    /// Check the trailing crc of a hex-encoded frame.
    Verify(VerifyArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Watch(args) => watch::run(args, format).await,
        Command::Seal(args) => seal::run(args),
        Command::Verify(args) => verify::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TransportArg {
    Tcp,
    Udp,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Device endpoint, e.g. 192.168.1.10:6668.
    pub target: String,
    /// Transport family.
    #[arg(long, short = 't', default_value = "tcp")]
    pub transport: TransportArg,
    /// Heartbeat silent-window length (e.g. 8s, 500ms).
    #[arg(long, default_value = "8s")]
    pub timeout: String,
    /// Consecutive heartbeat misses before the session is torn down.
    #[arg(long, default_value = "3")]
    pub miss_limit: u32,
    /// Consecutive crc failures before the session is torn down.
    #[arg(long, default_value = "20")]
    pub fail_limit: u32,
    /// Read the trailing check value little-endian instead of big-endian.
    #[arg(long)]
    pub little_endian: bool,
    /// Stamp frames at the tail instead of the head.
    #[arg(long)]
    pub tail: bool,
    /// Separator between stamp fields.
    #[arg(long, default_value = "/-/")]
    pub separator: String,
    /// Skip the millisecond timestamp stamp field.
    #[arg(long)]
    pub no_timestamp: bool,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SealArgs {
    /// Raw string payload.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Hex-encoded payload.
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
    /// Append the check value little-endian instead of big-endian.
    #[arg(long)]
    pub little_endian: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Hex-encoded frame including the trailing check value.
    pub frame: String,
    /// Read the trailing check value little-endian instead of big-endian.
    #[arg(long)]
    pub little_endian: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}
