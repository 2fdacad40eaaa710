pub mod config;
pub mod migrate;
pub mod reprice;
pub mod route;
pub mod shipping;

use std::future::Future;

use jisfast_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use jisfast_core::errors::ApplicationError;
use jisfast_db::{connect_with_config, migrations, DbPool, RepositoryError};
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_DOMAIN: u8 = 5;
pub const EXIT_INPUT: u8 = 6;

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
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data<T: Serialize>(
        command: &str,
        message: impl Into<String>,
        data: &T,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(
                command,
                "serialization",
                format!("failed to serialize command result: {error}"),
                EXIT_RUNTIME,
            ),
        }
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
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Failure raised inside a command before it is rendered as a payload.
#[derive(Debug)]
pub(crate) struct CommandFailure {
    error_class: String,
    message: String,
    exit_code: u8,
}

impl CommandFailure {
    pub(crate) fn new(error_class: &str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class: error_class.to_string(), message: message.into(), exit_code }
    }

    pub(crate) fn input(message: impl Into<String>) -> Self {
        Self::new("input_file", message, EXIT_INPUT)
    }

    pub(crate) fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, &self.error_class, self.message, self.exit_code)
    }
}

impl From<ApplicationError> for CommandFailure {
    fn from(error: ApplicationError) -> Self {
        let exit_code = match &error {
            ApplicationError::Domain(_) => EXIT_DOMAIN,
            ApplicationError::Persistence(_) => EXIT_DATABASE,
            ApplicationError::Configuration(_) => EXIT_CONFIG,
        };
        Self::new(error.error_class(), error.to_string(), exit_code)
    }
}

impl From<RepositoryError> for CommandFailure {
    fn from(error: RepositoryError) -> Self {
        Self::new("persistence", error.to_string(), EXIT_DATABASE)
    }
}

pub(crate) fn load_config(overrides: ConfigOverrides) -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() }).map_err(|error| {
        CommandFailure::new("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG)
    })
}

/// Drives `future` on a fresh current-thread runtime.
pub(crate) fn block_on<T, F>(future: F) -> Result<T, CommandFailure>
where
    F: Future<Output = Result<T, CommandFailure>>,
{
    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandFailure::new(
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        })?;
    runtime.block_on(future)
}

/// Connects and brings the schema up to date.
pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), EXIT_DATABASE))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_DATABASE))?;
    Ok(pool)
}
