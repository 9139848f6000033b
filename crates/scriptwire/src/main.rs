#[cfg(not(unix))]
compile_error!("the scriptwire CLI requires Unix domain sockets");

mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{parse_duration, Command};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "scriptwire", version, about = "Framed script channel CLI")]
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

    /// How long to wait for the connection and for replies (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", default_value = "5s", global = true)]
    timeout: String,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result =
        parse_duration(&cli.timeout).and_then(|timeout| cmd::run(cli.command, format, timeout));

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
    fn parses_call_with_repeated_args() {
        let cli = Cli::try_parse_from([
            "scriptwire",
            "call",
            "/tmp/test.sock",
            "flushedQueue",
            "--arg",
            "1",
            "--arg",
            "[2]",
        ])
        .expect("call args should parse");

        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.method, "flushedQueue");
                assert_eq!(args.args, vec!["1", "[2]"]);
                assert_eq!(args.bridge, "__fbBatchedBridge");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn eval_rejects_script_and_file_together() {
        let err = Cli::try_parse_from([
            "scriptwire",
            "eval",
            "/tmp/test.sock",
            "1+1",
            "--file",
            "app.js",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn eval_requires_script_or_file() {
        let err = Cli::try_parse_from(["scriptwire", "eval", "/tmp/test.sock"])
            .expect_err("missing script should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn global_timeout_after_subcommand() {
        let cli = Cli::try_parse_from(["scriptwire", "serve", "/tmp/test.sock", "--timeout", "3s"])
            .expect("serve args should parse");
        assert_eq!(cli.timeout, "3s");
        assert!(matches!(cli.command, Command::Serve(_)));
    }
}
