use configurator_core::config::{AppConfig, LoadOptions};
use configurator_core::{ApplicationError, ConfigurationSession, OpenRequest, TemplateId, ValueId};
use configurator_rpc::JsonRpcBackend;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::commands::CommandResult;

#[derive(Debug, Clone)]
pub struct OpenArgs {
    pub template_id: i64,
    pub quantity: Decimal,
    pub prior_combination: Vec<i64>,
    pub edit: bool,
}

/// Opens a live session against the configured backend and reports it.
pub fn run(args: OpenArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return failure("config_validation", ApplicationError::from(error), 2),
    };

    let backend = match JsonRpcBackend::from_config(&config.backend) {
        Ok(backend) => backend,
        Err(error) => {
            return failure("backend_client", ApplicationError::Configuration(error.to_string()), 4);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "open",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let mut request = OpenRequest::new(TemplateId(args.template_id), args.quantity);
    request.prior_combination = args.prior_combination.into_iter().map(ValueId).collect();
    request.edit = args.edit;

    let result = runtime.block_on(ConfigurationSession::open(backend, config.session.context(), request));
    match result {
        Ok(session) => {
            info!(
                event_name = "configurator.cli.opened",
                session_id = %session.session_id(),
                "session opened from cli"
            );
            CommandResult::report("open", "configuration session opened", &session.report())
        }
        Err(error) => failure("session", error, 5),
    }
}

fn failure(error_class: &str, error: ApplicationError, exit_code: u8) -> CommandResult {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = error.into_interface(correlation_id.clone());
    CommandResult::failure(
        "open",
        error_class,
        format!("{} {interface} (correlation id {correlation_id})", interface.user_message()),
        exit_code,
    )
}
