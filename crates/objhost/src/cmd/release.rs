use objhost_runtime::{release_with, ProxyConfig};

use crate::cmd::{open_registry, parse_duration, ReleaseArgs};
use crate::exit::{runtime_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(
    args: ReleaseArgs,
    registry_dir: Option<std::path::PathBuf>,
    _format: OutputFormat,
) -> CliResult<i32> {
    let registry = open_registry(&registry_dir)?;
    let config = ProxyConfig {
        call_timeout: parse_duration(&args.timeout)?,
        ..ProxyConfig::default()
    };

    release_with(&args.name, &registry, &config)
        .map_err(|err| runtime_error("release failed", err))?;
    tracing::info!(name = %args.name, "released");

    Ok(SUCCESS)
}
