use objhost_runtime::{get_proxy_with, ProxyConfig};

use crate::cmd::{open_registry, parse_duration, parse_operand, GetArgs};
use crate::exit::{runtime_error, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn run(
    args: GetArgs,
    registry_dir: Option<std::path::PathBuf>,
    format: OutputFormat,
) -> CliResult<i32> {
    let registry = open_registry(&registry_dir)?;
    let config = ProxyConfig {
        call_timeout: parse_duration(&args.timeout)?,
        ..ProxyConfig::default()
    };

    let proxy = get_proxy_with(&args.name, &registry, &config)
        .map_err(|err| runtime_error("resolve failed", err))?;

    let value = match &args.key {
        Some(key) => proxy
            .get_item(parse_operand(key))
            .map_err(|err| runtime_error("get failed", err))?,
        None => proxy
            .snapshot()
            .map_err(|err| runtime_error("snapshot failed", err))?,
    };
    print_value(&value, format);

    Ok(SUCCESS)
}
