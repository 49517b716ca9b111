use crate::cmd::{open_registry, LsArgs};
use crate::exit::{registry_error, CliResult, SUCCESS};
use crate::output::{print_entries, OutputFormat};
use objhost_registry::Registry;

pub fn run(
    args: LsArgs,
    registry_dir: Option<std::path::PathBuf>,
    format: OutputFormat,
) -> CliResult<i32> {
    let registry = open_registry(&registry_dir)?;

    if args.sweep {
        let removed = registry
            .sweep()
            .map_err(|err| registry_error("sweep failed", err))?;
        for name in removed {
            tracing::info!(name, "removed stale entry");
        }
    }

    let entries = registry
        .list()
        .map_err(|err| registry_error("list failed", err))?;
    print_entries(&entries, format);

    Ok(SUCCESS)
}
