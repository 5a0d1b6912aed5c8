mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "fieldlink", version, about = "Field-device session CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format).await;

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_subcommand() {
        let cli = Cli::try_parse_from([
            "fieldlink",
            "watch",
            "192.168.1.10:6668",
            "--transport",
            "udp",
            "--timeout",
            "2s",
            "--count",
            "5",
        ])
        .expect("watch args should parse");

        assert!(matches!(cli.command, Command::Watch(_)));
    }

    #[test]
    fn rejects_conflicting_seal_payload_args() {
        let err = Cli::try_parse_from([
            "fieldlink",
            "seal",
            "--data",
            "hello",
            "--hex",
            "68656c6c6f",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_verify_subcommand() {
        let cli = Cli::try_parse_from(["fieldlink", "verify", "313233374b", "--little-endian"])
            .expect("verify args should parse");
        assert!(matches!(cli.command, Command::Verify(_)));
    }
}
