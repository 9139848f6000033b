use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use scriptwire_channel::DEFAULT_BRIDGE_OBJECT;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod eval;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host a diagnostic script engine on a socket.
    Serve(ServeArgs),
    /// Call a method on the bridge object and print the reply.
    Call(CallArgs),
    /// Run script text or an application script file.
    Eval(EvalArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Call(args) => call::run(args, format, timeout),
        Command::Eval(args) => eval::run(args, format, timeout),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after serving N connections.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Method name on the bridge object.
    pub method: String,
    /// Call argument as JSON. Repeat for each argument.
    #[arg(long = "arg", value_name = "JSON")]
    pub args: Vec<String>,
    /// Object that receives the call.
    #[arg(long, default_value = DEFAULT_BRIDGE_OBJECT)]
    pub bridge: String,
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Script text to run; its reply is printed.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub script: Option<String>,
    /// Run this file as the application script and report when it finishes.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
