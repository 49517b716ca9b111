use objhost_runtime::{get_proxy_with, ProxyConfig};

use crate::cmd::{open_registry, parse_duration, parse_operand, SetArgs};
use crate::exit::{runtime_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(
    args: SetArgs,
    registry_dir: Option<std::path::PathBuf>,
    _format: OutputFormat,
) -> CliResult<i32> {
    let registry = open_registry(&registry_dir)?;
    let config = ProxyConfig {
        call_timeout: parse_duration(&args.timeout)?,
        ..ProxyConfig::default()
    };

    let proxy = get_proxy_with(&args.name, &registry, &config)
        .map_err(|err| runtime_error("resolve failed", err))?;
    proxy
        .set_item(parse_operand(&args.key), parse_operand(&args.value))
        .map_err(|err| runtime_error("set failed", err))?;

    Ok(SUCCESS)
}
