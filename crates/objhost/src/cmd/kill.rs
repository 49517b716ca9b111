use objhost_runtime::{terminate_all, terminate_with};

use crate::cmd::{open_registry, KillArgs};
use crate::exit::{runtime_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

pub fn run(
    args: KillArgs,
    registry_dir: Option<std::path::PathBuf>,
    _format: OutputFormat,
) -> CliResult<i32> {
    let registry = open_registry(&registry_dir)?;

    if args.all {
        let terminated = terminate_all(&registry)
            .map_err(|err| runtime_error("terminate failed", err))?;
        for name in terminated {
            tracing::info!(name, "terminated");
        }
        return Ok(SUCCESS);
    }

    let Some(name) = &args.name else {
        return Err(CliError::new(USAGE, "a name or --all is required"));
    };
    terminate_with(name, &registry).map_err(|err| runtime_error("terminate failed", err))?;
    tracing::info!(name, "terminated");

    Ok(SUCCESS)
}
