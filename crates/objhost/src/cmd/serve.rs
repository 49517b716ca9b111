use std::sync::atomic::Ordering;
use std::sync::Arc;

use objhost_registry::FileRegistry;
use objhost_runtime::{JsonObject, ObjectOwner, OwnerConfig};
use serde_json::Value;
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{io_error, registry_error, runtime_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS};
use crate::output::OutputFormat;

pub fn run(
    args: ServeArgs,
    registry_dir: Option<std::path::PathBuf>,
    _format: OutputFormat,
) -> CliResult<i32> {
    let dir = registry_dir.unwrap_or_else(FileRegistry::default_dir);
    let registry =
        Arc::new(FileRegistry::open(&dir).map_err(|err| registry_error("registry open failed", err))?);

    let initial = resolve_initial(&args)?;
    let config = OwnerConfig {
        socket_dir: Some(dir),
        ..OwnerConfig::default()
    };

    let owner = ObjectOwner::bind(
        &args.name,
        Box::new(JsonObject::new(initial)),
        registry,
        config,
    )
    .map_err(|err| runtime_error("bind failed", err))?;

    let shutdown = owner.shutdown_handle();
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    info!(name = %args.name, endpoint = %owner.endpoint().display(), "serving");
    owner
        .serve()
        .map_err(|err| runtime_error("serve failed", err))?;

    Ok(SUCCESS)
}

fn resolve_initial(args: &ServeArgs) -> CliResult<Value> {
    if let Some(literal) = &args.initial {
        return serde_json::from_str(literal)
            .map_err(|err| CliError::new(DATA_INVALID, format!("--initial is not valid JSON: {err}")));
    }
    if let Some(path) = &args.file {
        let bytes = std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return serde_json::from_slice(&bytes).map_err(|err| {
            CliError::new(
                DATA_INVALID,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    // An empty object serves as a blank shared dictionary.
    Ok(Value::Object(serde_json::Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_defaults_to_empty_object() {
        let args = ServeArgs {
            name: "x".to_string(),
            initial: None,
            file: None,
        };
        assert_eq!(resolve_initial(&args).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn invalid_initial_json_rejected() {
        let args = ServeArgs {
            name: "x".to_string(),
            initial: Some("{broken".to_string()),
            file: None,
        };
        let err = resolve_initial(&args).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
