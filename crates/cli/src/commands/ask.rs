use anyhow::Context;
use stratus_core::config::{AppConfig, LoadOptions};
use stratus_core::{ChatReply, ChatRequest, GatewayError};
use stratus_server::bootstrap::bootstrap_with_config;
use tokio_util::sync::CancellationToken;

use crate::commands::{CommandResult, EXIT_CONFIG_FAILURE, EXIT_RUNTIME_FAILURE};

const LOCAL_CLIENT: &str = "cli";

pub fn run(message: &str, unit: Option<&str>, session: Option<&str>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG_FAILURE,
            )
        }
    };

    let mut request = ChatRequest::new(message);
    if let Some(unit) = unit {
        request = request.with_unit(unit);
    }
    if let Some(session) = session {
        request = request.with_session(session);
    }

    match execute(config, request) {
        Ok(reply) => CommandResult::success_with_session("ask", reply.reply, Some(reply.session_id)),
        Err(error) => {
            let error_class = match error.downcast_ref::<GatewayError>() {
                Some(gateway_error) => gateway_error.kind(),
                None => "runtime",
            };
            CommandResult::failure("ask", error_class, format!("{error:#}"), EXIT_RUNTIME_FAILURE)
        }
    }
}

fn execute(config: AppConfig, request: ChatRequest) -> anyhow::Result<ChatReply> {
    let app = bootstrap_with_config(config).context("failed to assemble gateway")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;

    let reply = runtime.block_on(app.gateway.handle(request, LOCAL_CLIENT, &CancellationToken::new()))?;
    Ok(reply)
}
