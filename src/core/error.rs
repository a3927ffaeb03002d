use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ManifestNotFound,
    ManifestInvalidJson,
    ManifestInvalidValue,

    ValidationInvalidArgument,

    FeatureUnknown,
    ComponentUnknown,

    MaterializeTemplateMissing,

    BuildImageFailed,
    BuildCompileFailed,

    DeployApplyFailed,
    DeployPortForwardFailed,

    SyncCopyFailed,
    SyncRestartFailed,
    SyncPodNotFound,

    SecretBootstrapFailed,

    PreflightToolMissing,
    PreflightToolOutdated,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ManifestNotFound => "manifest.not_found",
            ErrorCode::ManifestInvalidJson => "manifest.invalid_json",
            ErrorCode::ManifestInvalidValue => "manifest.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::FeatureUnknown => "feature.unknown",
            ErrorCode::ComponentUnknown => "component.unknown",

            ErrorCode::MaterializeTemplateMissing => "materialize.template_missing",

            ErrorCode::BuildImageFailed => "build.image_failed",
            ErrorCode::BuildCompileFailed => "build.compile_failed",

            ErrorCode::DeployApplyFailed => "deploy.apply_failed",
            ErrorCode::DeployPortForwardFailed => "deploy.port_forward_failed",

            ErrorCode::SyncCopyFailed => "sync.copy_failed",
            ErrorCode::SyncRestartFailed => "sync.restart_failed",
            ErrorCode::SyncPodNotFound => "sync.pod_not_found",

            ErrorCode::SecretBootstrapFailed => "secret.bootstrap_failed",

            ErrorCode::PreflightToolMissing => "preflight.tool_missing",
            ErrorCode::PreflightToolOutdated => "preflight.tool_outdated",

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
pub struct ManifestNotFoundDetails {
    pub searched: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUnknownDetails {
    pub id: String,
    pub known: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentUnknownDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMissingDetails {
    pub component_id: String,
    pub template: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFailedDetails {
    pub component_id: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployFailedDetails {
    pub component_id: String,
    pub manifest: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortForwardFailedDetails {
    pub component_id: String,
    pub resource: String,
    pub forward: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCopyFailedDetails {
    pub component_id: String,
    pub local_path: String,
    pub remote_path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRestartFailedDetails {
    pub component_id: String,
    pub command: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPodNotFoundDetails {
    pub component_id: String,
    pub selector: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBootstrapFailedDetails {
    pub secret_name: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMissingDetails {
    pub tool: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutdatedDetails {
    pub tool: String,
    pub found: String,
    pub required: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn manifest_not_found(searched: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ManifestNotFound,
            "Platform manifest not found",
            to_details(ManifestNotFoundDetails { searched }),
        )
        .with_hint("Run 'bringup init' in the platform repository to create bringup.json")
    }

    pub fn manifest_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ManifestInvalidJson,
            "Platform manifest is not valid JSON",
            to_details(ManifestInvalidJsonDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    pub fn manifest_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ManifestInvalidValue,
            "Platform manifest has an invalid value",
            to_details(ManifestInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        value: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
                value,
                tried,
            }),
        )
    }

    pub fn feature_unknown(id: impl Into<String>, known: Vec<String>) -> Self {
        let id = id.into();
        let hint = format!("Known features: {}", known.join(", "));
        Self::new(
            ErrorCode::FeatureUnknown,
            format!("Unknown feature: {id}"),
            to_details(FeatureUnknownDetails { id, known }),
        )
        .with_hint(hint)
    }

    pub fn component_unknown(id: impl Into<String>, feature: Option<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ComponentUnknown,
            format!("Unknown component: {id}"),
            to_details(ComponentUnknownDetails { id, feature }),
        )
    }

    pub fn materialize_template_missing(
        component_id: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::MaterializeTemplateMissing,
            "Config template missing or unreadable",
            to_details(TemplateMissingDetails {
                component_id: component_id.into(),
                template: template.into(),
            }),
        )
    }

    pub fn build_image_failed(
        component_id: impl Into<String>,
        command: impl Into<String>,
        exit_code: Option<i32>,
        output_tail: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::BuildImageFailed,
            "Image build failed",
            to_details(BuildFailedDetails {
                component_id: component_id.into(),
                command: command.into(),
                exit_code,
                output_tail,
            }),
        )
    }

    pub fn build_compile_failed(
        component_id: impl Into<String>,
        command: impl Into<String>,
        exit_code: Option<i32>,
        output_tail: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::BuildCompileFailed,
            "Local compile failed",
            to_details(BuildFailedDetails {
                component_id: component_id.into(),
                command: command.into(),
                exit_code,
                output_tail,
            }),
        )
    }

    pub fn deploy_apply_failed(
        component_id: impl Into<String>,
        manifest: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::DeployApplyFailed,
            "Manifest apply failed",
            to_details(DeployFailedDetails {
                component_id: component_id.into(),
                manifest: manifest.into(),
                error: error.into(),
            }),
        )
    }

    pub fn deploy_port_forward_failed(
        component_id: impl Into<String>,
        resource: impl Into<String>,
        forward: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::DeployPortForwardFailed,
            "Port forward failed",
            to_details(PortForwardFailedDetails {
                component_id: component_id.into(),
                resource: resource.into(),
                forward: forward.into(),
                error: error.into(),
            }),
        )
    }

    pub fn sync_copy_failed(
        component_id: impl Into<String>,
        local_path: impl Into<String>,
        remote_path: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SyncCopyFailed,
            "File sync failed",
            to_details(SyncCopyFailedDetails {
                component_id: component_id.into(),
                local_path: local_path.into(),
                remote_path: remote_path.into(),
                error: error.into(),
            }),
        )
    }

    pub fn sync_restart_failed(
        component_id: impl Into<String>,
        command: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SyncRestartFailed,
            "In-place restart failed",
            to_details(SyncRestartFailedDetails {
                component_id: component_id.into(),
                command: command.into(),
                error: error.into(),
            }),
        )
    }

    pub fn sync_pod_not_found(
        component_id: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        // A pod mid-rollout has no Running phase yet; the same sync
        // can succeed moments later.
        Self::new(
            ErrorCode::SyncPodNotFound,
            "No running pod matched the component selector",
            to_details(SyncPodNotFoundDetails {
                component_id: component_id.into(),
                selector: selector.into(),
            }),
        )
        .with_hint("Run 'bringup up' to deploy the component before syncing")
        .with_retryable(true)
    }

    pub fn secret_bootstrap_failed(
        secret_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SecretBootstrapFailed,
            "Secret bootstrap failed",
            to_details(SecretBootstrapFailedDetails {
                secret_name: secret_name.into(),
                error: error.into(),
            }),
        )
    }

    pub fn preflight_tool_missing(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        let hint = format!("Install {tool} and ensure it is on PATH");
        Self::new(
            ErrorCode::PreflightToolMissing,
            format!("Required tool not found: {tool}"),
            to_details(ToolMissingDetails { tool }),
        )
        .with_hint(hint)
    }

    pub fn preflight_tool_outdated(
        tool: impl Into<String>,
        found: impl Into<String>,
        required: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::PreflightToolOutdated,
            "Required tool is too old",
            to_details(ToolOutdatedDetails {
                tool: tool.into(),
                found: found.into(),
                required: required.into(),
            }),
        )
    }

    pub fn internal_io(err: std::io::Error, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "I/O error",
            to_details(InternalIoErrorDetails {
                error: err.to_string(),
                context,
            }),
        )
    }

    pub fn internal_json(err: serde_json::Error, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalIoErrorDetails {
                error: err.to_string(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            message,
            Value::Object(serde_json::Map::new()),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::internal_io(err, None)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::internal_json(err, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_lookup_failures_are_marked_retryable() {
        let err = Error::sync_pod_not_found("gateway", "app=gateway");
        assert_eq!(err.code.as_str(), "sync.pod_not_found");
        assert_eq!(err.retryable, Some(true));
    }

    #[test]
    fn build_failures_leave_retryable_unset() {
        let err = Error::build_image_failed("db", "docker build", Some(1), None);
        assert_eq!(err.retryable, None);
    }
}
