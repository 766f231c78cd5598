use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the ping test service on an endpoint.
    Serve(ServeArgs),
    /// Invoke a method and print the streamed responses.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Maximum frame payload size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Full method path, e.g. /test.TestService/PingList.
    pub method: String,
    /// JSON request payload.
    #[arg(long, conflicts_with = "file", default_value = "{}")]
    pub json: String,
    /// Read the request payload from a file instead.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Metadata entry to send with the request (repeatable, key=value).
    #[arg(long = "metadata", short = 'm', value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,
    /// Per-read timeout while waiting for responses (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
