use std::fs;
use std::path::Path;

use anyhow::Context;
use configurator_core::config::{AppConfig, LoadOptions};
use configurator_core::configurator::backend::LoadResponse;
use configurator_core::{ConfigurationSession, OfflineBackend};

use crate::commands::CommandResult;

/// Builds a session from a recorded `get_values` response and reports it.
pub fn run(snapshot: &Path) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "inspect",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let load = match read_snapshot(snapshot) {
        Ok(load) => load,
        Err(error) => return CommandResult::failure("inspect", "snapshot", format!("{error:#}"), 4),
    };

    let backend = OfflineBackend::new(load.clone());
    match ConfigurationSession::from_load_response(backend, config.session.context(), load) {
        Ok(session) => {
            let report = session.report();
            let message = if report.valid {
                "configuration is valid"
            } else {
                "configuration has excluded selections"
            };
            CommandResult::report("inspect", message, &report)
        }
        Err(error) => CommandResult::failure("inspect", "session", error.to_string(), 5),
    }
}

fn read_snapshot(path: &Path) -> anyhow::Result<LoadResponse> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read snapshot `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("snapshot `{}` is not a configurator response", path.display()))
}
