use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use objhost_registry::FileRegistry;

use crate::exit::{registry_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod get;
pub mod kill;
pub mod ls;
pub mod release;
pub mod serve;
pub mod set;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an owner process in the foreground.
    Serve(ServeArgs),
    /// List registered objects.
    Ls(LsArgs),
    /// Read an item (or the whole object) through a one-shot proxy.
    Get(GetArgs),
    /// Write an item through a one-shot proxy.
    Set(SetArgs),
    /// Ask an owner to deregister and exit gracefully.
    Release(ReleaseArgs),
    /// Kill an owner process (or all of them) by registered pid.
    Kill(KillArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, registry_dir: Option<PathBuf>, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, registry_dir, format),
        Command::Ls(args) => ls::run(args, registry_dir, format),
        Command::Get(args) => get::run(args, registry_dir, format),
        Command::Set(args) => set::run(args, registry_dir, format),
        Command::Release(args) => release::run(args, registry_dir, format),
        Command::Kill(args) => kill::run(args, registry_dir, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Object name to register.
    pub name: String,
    /// Initial value as a JSON literal.
    #[arg(long, conflicts_with = "file")]
    pub initial: Option<String>,
    /// Read the initial value from a JSON file.
    #[arg(long, conflicts_with = "initial")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct LsArgs {
    /// Remove stale entries of dead owners before listing.
    #[arg(long)]
    pub sweep: bool,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Object name to resolve.
    pub name: String,
    /// Item key (JSON literal or bare string). Omit to print the whole
    /// object.
    pub key: Option<String>,
    /// Per-call timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Object name to resolve.
    pub name: String,
    /// Item key (JSON literal or bare string).
    pub key: String,
    /// New value (JSON literal or bare string).
    pub value: String,
    /// Per-call timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Object name to release.
    pub name: String,
    /// How long to wait for the owner's acknowledgement.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct KillArgs {
    /// Object name to kill.
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub name: Option<String>,
    /// Kill every registered owner.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn open_registry(registry_dir: &Option<PathBuf>) -> CliResult<FileRegistry> {
    let dir = registry_dir
        .clone()
        .unwrap_or_else(FileRegistry::default_dir);
    FileRegistry::open(dir).map_err(|err| registry_error("registry open failed", err))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

/// Interpret a CLI operand as a JSON literal, falling back to a bare string.
pub(crate) fn parse_operand(input: &str) -> serde_json::Value {
    serde_json::from_str(input).unwrap_or_else(|_| serde_json::Value::String(input.to_string()))
}
