use std::cmp::Ordering;
use std::collections::BTreeMap;

use semver::Version;
use serde::Serialize;
use serde_json::Value;

use crate::core::exec;
use crate::core::manifest::Platform;
use crate::core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreflightSeverity {
    Info,
    Warning,
    Error,
}

impl PreflightSeverity {
    fn sort_key(&self) -> u8 {
        match self {
            PreflightSeverity::Error => 0,
            PreflightSeverity::Warning => 1,
            PreflightSeverity::Info => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightIssue {
    pub severity: PreflightSeverity,
    pub code: String,
    pub message: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightSummary {
    pub checks_run: usize,
    pub issues: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub command: String,
    pub platform: String,
    pub summary: PreflightSummary,
    pub issues: Vec<PreflightIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Error,
    Warning,
}

/// External tools the pipelines shell out to, with the oldest versions
/// the invocations are known to work against.
const DOCKER_MIN: &str = "20.10.0";
const KUBECTL_MIN: &str = "1.21.0";

struct ToolCheck {
    name: &'static str,
    version_args: &'static [&'static str],
    min_version: Option<&'static str>,
}

const DOCKER: ToolCheck = ToolCheck {
    name: "docker",
    version_args: &["--version"],
    min_version: Some(DOCKER_MIN),
};

const KUBECTL: ToolCheck = ToolCheck {
    name: "kubectl",
    version_args: &["version", "--client"],
    min_version: Some(KUBECTL_MIN),
};

const CARGO: ToolCheck = ToolCheck {
    name: "cargo",
    version_args: &["--version"],
    min_version: None,
};

/// Extract the first `major.minor.patch` triple from version output.
pub fn parse_version(output: &str) -> Option<Version> {
    let re = regex::Regex::new(r"(\d+)\.(\d+)\.(\d+)").ok()?;
    let caps = re.captures(output)?;
    Version::parse(caps.get(0)?.as_str()).ok()
}

fn meets_minimum(found: &Version, minimum: &str) -> bool {
    match Version::parse(minimum) {
        Ok(min) => *found >= min,
        Err(_) => true,
    }
}

/// Every command shells out to kubectl; docker and cargo are only
/// needed by the pipelines that build.
fn required_tools(needs_docker: bool, needs_cargo: bool) -> Vec<&'static ToolCheck> {
    let mut required = vec![&KUBECTL];
    if needs_docker {
        required.push(&DOCKER);
    }
    if needs_cargo {
        required.push(&CARGO);
    }
    required
}

/// Hard gate run before dispatch: every tool the run will shell out to
/// must exist, and known-too-old versions are refused. Unparseable
/// version output is allowed through.
pub fn require_tools(needs_docker: bool, needs_cargo: bool) -> Result<()> {
    for tool in required_tools(needs_docker, needs_cargo) {
        if which::which(tool.name).is_err() {
            return Err(Error::preflight_tool_missing(tool.name));
        }

        let Some(minimum) = tool.min_version else {
            continue;
        };
        let Some(output) = exec::run_tool_optional(tool.name, tool.version_args, None) else {
            continue;
        };
        if let Some(found) = parse_version(&output) {
            if !meets_minimum(&found, minimum) {
                return Err(Error::preflight_tool_outdated(
                    tool.name,
                    found.to_string(),
                    minimum,
                ));
            }
        }
    }

    Ok(())
}

pub fn exit_code(report: &PreflightReport, fail_on: FailOn) -> i32 {
    let has_errors = report
        .issues
        .iter()
        .any(|i| i.severity == PreflightSeverity::Error);
    if has_errors {
        return 1;
    }

    if fail_on == FailOn::Warning {
        let has_warnings = report
            .issues
            .iter()
            .any(|i| i.severity == PreflightSeverity::Warning);
        if has_warnings {
            return 1;
        }
    }

    0
}

/// Full environment scan for the doctor command: tool availability and
/// versions, manifest-referenced files, feature reachability, secrets.
pub fn run(platform: &Platform) -> PreflightReport {
    let mut checker = Checker::new(platform);
    checker.check_tools();
    checker.check_manifest_files();
    checker.check_reachability();
    checker.check_secrets();
    checker.finish()
}

struct Checker<'a> {
    platform: &'a Platform,
    issues: Vec<PreflightIssue>,
    checks_run: usize,
}

impl<'a> Checker<'a> {
    fn new(platform: &'a Platform) -> Self {
        Self {
            platform,
            issues: Vec::new(),
            checks_run: 0,
        }
    }

    fn push_issue(
        &mut self,
        severity: PreflightSeverity,
        code: &str,
        message: &str,
        subject: &str,
        details: Option<Value>,
    ) {
        self.issues.push(PreflightIssue {
            severity,
            code: code.to_string(),
            message: message.to_string(),
            subject: subject.to_string(),
            details,
        });
    }

    fn needs_cargo(&self) -> bool {
        self.platform
            .manifest
            .components
            .iter()
            .any(|c| c.supports_hot_reload())
    }

    fn check_tool(&mut self, tool: &ToolCheck, required: bool) {
        self.checks_run += 1;

        if which::which(tool.name).is_err() {
            let severity = if required {
                PreflightSeverity::Error
            } else {
                PreflightSeverity::Info
            };
            self.push_issue(severity, "TOOL_MISSING", "Tool not found on PATH", tool.name, None);
            return;
        }

        let Some(output) = exec::run_tool_optional(tool.name, tool.version_args, None) else {
            self.push_issue(
                PreflightSeverity::Info,
                "TOOL_VERSION_UNKNOWN",
                "Tool found but version probe failed",
                tool.name,
                None,
            );
            return;
        };

        let Some(found) = parse_version(&output) else {
            self.push_issue(
                PreflightSeverity::Info,
                "TOOL_VERSION_UNKNOWN",
                "Could not parse tool version",
                tool.name,
                Some(serde_json::json!({"output": output.lines().next().unwrap_or("")})),
            );
            return;
        };

        if let Some(minimum) = tool.min_version {
            if !meets_minimum(&found, minimum) {
                self.push_issue(
                    PreflightSeverity::Error,
                    "TOOL_OUTDATED",
                    "Tool version is below the supported minimum",
                    tool.name,
                    Some(serde_json::json!({"found": found.to_string(), "required": minimum})),
                );
            }
        }
    }

    fn check_tools(&mut self) {
        self.check_tool(&DOCKER, true);
        self.check_tool(&KUBECTL, true);
        let needs_cargo = self.needs_cargo();
        self.check_tool(&CARGO, needs_cargo);
    }

    fn check_manifest_files(&mut self) {
        for component in &self.platform.manifest.components {
            self.checks_run += 1;

            let manifest_path = self.platform.resolve_path(&component.manifest);
            if !manifest_path.exists() {
                self.push_issue(
                    PreflightSeverity::Error,
                    "MISSING_FILE",
                    "Deploy manifest does not exist",
                    &component.id,
                    Some(serde_json::json!({"path": component.manifest})),
                );
            } else {
                self.check_resource_name(component, &manifest_path);
            }

            let Some(hot) = &component.hot_reload else {
                continue;
            };

            if !self.platform.resolve_path(&hot.dockerfile).exists() {
                self.push_issue(
                    PreflightSeverity::Error,
                    "MISSING_FILE",
                    "Hot-reload runtime dockerfile does not exist",
                    &component.id,
                    Some(serde_json::json!({"path": hot.dockerfile})),
                );
            }

            if let Some(config) = &hot.config {
                if !self.platform.resolve_path(&config.template).exists() {
                    self.push_issue(
                        PreflightSeverity::Error,
                        "MISSING_FILE",
                        "Config template does not exist",
                        &component.id,
                        Some(serde_json::json!({"path": config.template})),
                    );
                }
            }
        }
    }

    /// Port forwarding and sync address the workload by the component's
    /// resource name; a deploy manifest naming something else breaks
    /// both at runtime.
    fn check_resource_name(
        &mut self,
        component: &crate::core::component::ComponentDescriptor,
        manifest_path: &std::path::Path,
    ) {
        self.checks_run += 1;

        let Ok(content) = std::fs::read_to_string(manifest_path) else {
            return;
        };
        // Only the first document matters; multi-doc manifests keep the
        // workload first by convention.
        let Ok(doc) = serde_yml::from_str::<serde_yml::Value>(&content) else {
            return;
        };

        let declared = doc
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|n| n.as_str());

        if let Some(declared) = declared {
            let expected = component.resource_name();
            if declared != expected {
                self.push_issue(
                    PreflightSeverity::Warning,
                    "RESOURCE_NAME_MISMATCH",
                    "Deploy manifest names a different resource than the component targets",
                    &component.id,
                    Some(serde_json::json!({"declared": declared, "expected": expected})),
                );
            }
        }
    }

    fn check_reachability(&mut self) {
        self.checks_run += 1;

        if self.platform.manifest.features.is_empty() {
            self.push_issue(
                PreflightSeverity::Warning,
                "NO_FEATURES",
                "Manifest registers no features; nothing can be brought up",
                &self.platform.manifest.platform,
                None,
            );
            return;
        }

        let Ok(registry) = self.platform.registry() else {
            return;
        };
        let reachable = registry.all_components();
        for component in &self.platform.manifest.components {
            if !reachable.contains(&component.id) {
                self.push_issue(
                    PreflightSeverity::Warning,
                    "UNREACHABLE_COMPONENT",
                    "Component is not part of any feature",
                    &component.id,
                    None,
                );
            }
        }
    }

    fn check_secrets(&mut self) {
        let Some(secrets) = &self.platform.manifest.settings.secrets else {
            return;
        };
        self.checks_run += 1;

        let path = self.platform.resolve_path(&secrets.file);
        if !path.exists() {
            self.push_issue(
                PreflightSeverity::Warning,
                "SECRETS_FILE_MISSING",
                "Secrets file is configured but absent; bring-up will fail at bootstrap",
                &secrets.name,
                Some(serde_json::json!({"path": secrets.file})),
            );
        }
    }

    fn finish(mut self) -> PreflightReport {
        let mut counts = BTreeMap::new();
        for (label, severity) in [
            ("error", PreflightSeverity::Error),
            ("warning", PreflightSeverity::Warning),
            ("info", PreflightSeverity::Info),
        ] {
            counts.insert(
                label.to_string(),
                self.issues.iter().filter(|i| i.severity == severity).count(),
            );
        }

        self.issues.sort_by(|a, b| {
            let by_severity = a.severity.sort_key().cmp(&b.severity.sort_key());
            if by_severity != Ordering::Equal {
                return by_severity;
            }
            let by_code = a.code.cmp(&b.code);
            if by_code != Ordering::Equal {
                return by_code;
            }
            a.subject.cmp(&b.subject)
        });

        PreflightReport {
            command: "doctor.scan".to_string(),
            platform: self.platform.manifest.platform.clone(),
            summary: PreflightSummary {
                checks_run: self.checks_run,
                issues: counts,
            },
            issues: self.issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{PlatformManifest, MANIFEST_FILE};
    use tempfile::tempdir;

    #[test]
    fn parses_docker_style_version() {
        let v = parse_version("Docker version 27.0.3, build 7d4bcd8").unwrap();
        assert_eq!(v, Version::new(27, 0, 3));
    }

    #[test]
    fn parses_kubectl_style_version() {
        let v = parse_version("Client Version: v1.30.2\nKustomize Version: v5.0.4").unwrap();
        assert_eq!(v, Version::new(1, 30, 2));
    }

    #[test]
    fn minimum_comparison() {
        assert!(meets_minimum(&Version::new(27, 0, 3), DOCKER_MIN));
        assert!(!meets_minimum(&Version::new(19, 3, 0), DOCKER_MIN));
        // malformed minimum never blocks
        assert!(meets_minimum(&Version::new(0, 1, 0), "not-a-version"));
    }

    #[test]
    fn required_tools_gate_docker_and_cargo() {
        let names = |docker, cargo| -> Vec<&str> {
            required_tools(docker, cargo).iter().map(|t| t.name).collect()
        };
        assert_eq!(names(false, false), vec!["kubectl"]);
        assert_eq!(names(true, false), vec!["kubectl", "docker"]);
        assert_eq!(names(true, true), vec!["kubectl", "docker", "cargo"]);
    }

    fn platform_in(dir: &std::path::Path, manifest: &str) -> Platform {
        std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        let parsed: PlatformManifest = serde_json::from_str(manifest).unwrap();
        Platform {
            root: dir.to_path_buf(),
            manifest: parsed,
        }
    }

    #[test]
    fn missing_deploy_manifest_is_an_error_issue() {
        let dir = tempdir().unwrap();
        let platform = platform_in(
            dir.path(),
            r#"{
                "platform": "architus",
                "features": [{"id": "core", "components": ["db"]}],
                "components": [{"id": "db", "path": "db", "manifest": "kube/db.yaml"}]
            }"#,
        );

        let report = run(&platform);
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == "MISSING_FILE"
                && i.subject == "db"
                && i.severity == PreflightSeverity::Error));
        assert!(report.summary.issues["error"] >= 1);
    }

    #[test]
    fn unreachable_component_is_flagged() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("kube")).unwrap();
        std::fs::write(dir.path().join("kube/db.yaml"), "kind: Deployment\n").unwrap();
        std::fs::write(dir.path().join("kube/sandbox.yaml"), "kind: Deployment\n").unwrap();

        let platform = platform_in(
            dir.path(),
            r#"{
                "platform": "architus",
                "features": [{"id": "core", "components": ["db"]}],
                "components": [
                    {"id": "db", "path": "db", "manifest": "kube/db.yaml"},
                    {"id": "sandbox", "path": "sandbox", "manifest": "kube/sandbox.yaml"}
                ]
            }"#,
        );

        let report = run(&platform);
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == "UNREACHABLE_COMPONENT" && i.subject == "sandbox"));
    }

    #[test]
    fn mismatched_resource_name_is_a_warning() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("kube")).unwrap();
        std::fs::write(
            dir.path().join("kube/db.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: postgres\n",
        )
        .unwrap();

        let platform = platform_in(
            dir.path(),
            r#"{
                "platform": "architus",
                "features": [{"id": "core", "components": ["db"]}],
                "components": [{"id": "db", "path": "db", "manifest": "kube/db.yaml"}]
            }"#,
        );

        let report = run(&platform);
        let issue = report
            .issues
            .iter()
            .find(|i| i.code == "RESOURCE_NAME_MISMATCH")
            .unwrap();
        assert_eq!(issue.severity, PreflightSeverity::Warning);
        assert_eq!(issue.details.as_ref().unwrap()["declared"], "postgres");
        assert_eq!(issue.details.as_ref().unwrap()["expected"], "db");
    }

    #[test]
    fn matching_resource_name_raises_no_issue() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("kube")).unwrap();
        std::fs::write(
            dir.path().join("kube/db.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: db\n",
        )
        .unwrap();

        let platform = platform_in(
            dir.path(),
            r#"{
                "platform": "architus",
                "features": [{"id": "core", "components": ["db"]}],
                "components": [{"id": "db", "path": "db", "manifest": "kube/db.yaml"}]
            }"#,
        );

        let report = run(&platform);
        assert!(!report.issues.iter().any(|i| i.code == "RESOURCE_NAME_MISMATCH"));
    }

    #[test]
    fn empty_feature_table_is_a_warning() {
        let dir = tempdir().unwrap();
        let platform = platform_in(dir.path(), r#"{"platform": "architus"}"#);
        let report = run(&platform);
        assert!(report.issues.iter().any(|i| i.code == "NO_FEATURES"));
    }

    #[test]
    fn exit_code_honors_fail_on() {
        let report = PreflightReport {
            command: "doctor.scan".to_string(),
            platform: "architus".to_string(),
            summary: PreflightSummary {
                checks_run: 1,
                issues: BTreeMap::new(),
            },
            issues: vec![PreflightIssue {
                severity: PreflightSeverity::Warning,
                code: "NO_FEATURES".to_string(),
                message: String::new(),
                subject: String::new(),
                details: None,
            }],
        };
        assert_eq!(exit_code(&report, FailOn::Error), 0);
        assert_eq!(exit_code(&report, FailOn::Warning), 1);
    }
}
