use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A local-port to workload-port mapping established after deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub local: u16,
    pub remote: u16,
}

impl std::fmt::Display for PortForward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

/// One local-path to in-container-path copy registered for hot reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPair {
    pub local: String,
    pub remote: String,
}

/// Editable config seeded from a checked-in template on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSeed {
    /// Materialized file, relative to the platform root. Git-ignored.
    pub path: String,
    /// Checked-in default template, relative to the platform root.
    pub template: String,
}

/// Hot-reload behavior for components compiled from source locally.
///
/// Present only on components whose binary can be rebuilt on the host,
/// copied into the running workload, and restarted in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotReloadSpec {
    /// Build target directory relative to the platform root. Its build
    /// metadata names the produced binary when `binary` is not set.
    pub build_target: String,
    /// Full build command line. Defaults to a package build of the
    /// target's package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    /// Compiled binary path relative to the platform root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Locally-built dependency paths whose changes also trigger a rebuild.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_deps: Vec<String>,
    /// Additional watched files (globs relative to the platform root),
    /// e.g. shared protocol schemas.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watch: Vec<String>,
    /// Minimal runtime dockerfile (binary + config only).
    pub dockerfile: String,
    /// Files synced into the already-running workload after each
    /// successful recompilation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync: Vec<SyncPair>,
    /// Extra process arguments for the restarted binary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// In-place restart command executed inside the workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSeed>,
}

impl HotReloadSpec {
    /// Restart command, defaulting to signalling the container's main
    /// process so the runtime restarts it without recreating the pod.
    pub fn restart_command(&self) -> Vec<String> {
        match &self.restart_command {
            Some(cmd) if !cmd.is_empty() => cmd.clone(),
            _ => vec!["kill".to_string(), "1".to_string()],
        }
    }
}

/// Static per-component build and deploy metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub id: String,
    /// Source tree relative to the platform root.
    pub path: String,
    /// Dockerfile for the standard from-source build. Defaults to
    /// `<path>/Dockerfile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    /// Deploy manifest relative to the platform root.
    pub manifest: String,
    /// Workload resource name in the cluster. Defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Shared library paths this component's build depends on; admitted
    /// into the build context alongside `path`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_forwards: Vec<PortForward>,
    /// Environment bindings applied to this component's build invocations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hot_reload: Option<HotReloadSpec>,
}

impl ComponentDescriptor {
    pub fn resource_name(&self) -> &str {
        self.resource.as_deref().unwrap_or(&self.id)
    }

    pub fn dockerfile_path(&self) -> String {
        match &self.dockerfile {
            Some(p) => p.clone(),
            None => format!("{}/Dockerfile", self.path.trim_end_matches('/')),
        }
    }

    pub fn image_ref(&self, prefix: &str, tag: &str) -> String {
        format!("{}/{}:{}", prefix.trim_end_matches('/'), self.id, tag)
    }

    pub fn supports_hot_reload(&self) -> bool {
        self.hot_reload.is_some()
    }
}
