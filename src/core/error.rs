use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationMissingArgument,
    ValidationInvalidArgument,

    PrivilegeRequired,

    DeployPathInvalid,

    ExternalCommandFailed,
    SupervisorUnavailable,

    TemplateInlineFailed,
    TemplateDirInvalid,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PrivilegeRequired => "privilege.required",

            ErrorCode::DeployPathInvalid => "deploy.path_invalid",

            ErrorCode::ExternalCommandFailed => "external.command_failed",
            ErrorCode::SupervisorUnavailable => "supervisor.unavailable",

            ErrorCode::TemplateInlineFailed => "template.inline_failed",
            ErrorCode::TemplateDirInvalid => "template.dir_invalid",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployPathInvalidDetails {
    pub path: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInlineFailedDetails {
    pub template: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    /// Exit status of the failing external command, when there is one.
    /// The CLI layer propagates this as the process exit code.
    pub exit_status: Option<i32>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            exit_status: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            serde_json::json!({ "args": args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            value,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn privilege_required(required_user: impl Into<String>) -> Self {
        let user = required_user.into();
        Self::new(
            ErrorCode::PrivilegeRequired,
            format!("This command must be run as {}", user),
            serde_json::json!({ "requiredUser": user }),
        )
        .with_hint("Re-run under sudo")
    }

    pub fn deploy_path_invalid(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let details = serde_json::to_value(DeployPathInvalidDetails {
            path: path.into(),
            problem: problem.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::DeployPathInvalid, "Invalid deploy path", details)
    }

    pub fn external_command_failed(details: ExternalCommandFailedDetails) -> Self {
        let exit_code = details.exit_code;
        let message = format!("Command failed: {}", details.command);
        let details =
            serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        let mut err = Self::new(ErrorCode::ExternalCommandFailed, message, details);
        err.exit_status = Some(exit_code);
        err
    }

    pub fn supervisor_unavailable(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SupervisorUnavailable,
            "Service supervisor is unavailable",
            serde_json::json!({ "tool": tool.into(), "error": error.into() }),
        )
    }

    pub fn template_inline_failed(template: impl Into<String>, error: impl Into<String>) -> Self {
        let details = serde_json::to_value(TemplateInlineFailedDetails {
            template: template.into(),
            error: error.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::TemplateInlineFailed,
            "CSS inlining failed",
            details,
        )
    }

    pub fn template_dir_invalid(path: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TemplateDirInvalid,
            "Invalid templates directory",
            serde_json::json!({ "path": path.into(), "problem": problem.into() }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::to_value(InternalIoErrorDetails {
            error: error.into(),
            context,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
