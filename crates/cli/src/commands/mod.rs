pub mod ask;
pub mod config;
pub mod doctor;

use serde::Serialize;

pub const EXIT_RUNTIME_FAILURE: u8 = 1;
pub const EXIT_CONFIG_FAILURE: u8 = 2;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_session(command, message, None)
    }

    pub fn success_with_session(
        command: &str,
        message: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            session_id,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            session_id: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Plain text output for commands that are read by humans first.
    pub fn text(exit_code: u8, output: impl Into<String>) -> Self {
        Self { exit_code, output: output.into() }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    })
}

pub(crate) fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
