pub mod cargo;
pub mod docker;
pub mod kubectl;

use std::path::PathBuf;

use crate::core::component::PortForward;
use crate::core::exec::CommandOutput;
use crate::core::{Error, Result};

/// Standard from-source image build, scoped by a context-ignore filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuildRequest {
    pub component_id: String,
    pub image: String,
    /// Build context root (the platform repo).
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    /// Rendered dockerignore admitting only this component's tree and
    /// its declared shared paths, staged next to the dockerfile copy.
    pub dockerignore: String,
    /// Descriptor env bindings, passed as build args.
    pub build_env: Vec<(String, String)>,
}

/// Minimal runtime image: the compiled binary and materialized config,
/// nothing built from source. Entrypoint args reach the dockerfile as
/// the `BRINGUP_ARGS` build arg (alongside `BRINGUP_BINARY` and
/// `BRINGUP_CONFIG`).
#[derive(Debug, Clone, PartialEq)]
pub struct MinimalImageRequest {
    pub component_id: String,
    pub image: String,
    pub dockerfile: PathBuf,
    pub binary: PathBuf,
    pub config: Option<PathBuf>,
    pub entrypoint_args: Vec<String>,
}

/// Local compilation with its rebuild triggers spelled out.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCompileRequest {
    pub component_id: String,
    pub command: String,
    pub workdir: PathBuf,
    /// Files whose changes must trigger recompilation: the component
    /// tree, its build descriptor, locally-built deps, watched files.
    pub triggers: Vec<PathBuf>,
    /// Binary the command is expected to produce.
    pub binary: PathBuf,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestApplyRequest {
    pub component_id: String,
    pub manifest: PathBuf,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortForwardRequest {
    pub component_id: String,
    pub resource: String,
    pub forwards: Vec<PortForward>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecretApplyRequest {
    pub name: String,
    /// Rendered Secret manifest, applied via stdin.
    pub manifest_yaml: String,
}

/// Post-compile patch of an already-running workload: copy each pair,
/// then restart the process in place. The workload is never recreated.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub component_id: String,
    pub resource: String,
    pub pairs: Vec<(PathBuf, String)>,
    pub restart_command: Vec<String>,
}

pub trait BuildBackend: Send + Sync {
    fn build_image(&self, req: &ImageBuildRequest) -> Result<()>;
    fn build_minimal_image(&self, req: &MinimalImageRequest) -> Result<()>;
    fn compile(&self, req: &LocalCompileRequest) -> Result<()>;
}

pub trait ClusterBackend: Send + Sync {
    fn apply_secret(&self, req: &SecretApplyRequest) -> Result<()>;
    fn apply_manifest(&self, req: &ManifestApplyRequest) -> Result<()>;
    fn delete_manifest(&self, req: &ManifestApplyRequest) -> Result<()>;
    /// Establish every declared forward against the workload. Returns
    /// the pid of the detached forwarder.
    fn port_forward(&self, req: &PortForwardRequest) -> Result<u32>;
}

pub trait SyncBackend: Send + Sync {
    fn sync(&self, req: &SyncRequest) -> Result<()>;
}

const TAIL_LINES: usize = 15;

/// Last lines of a failed command's output, stderr preferred.
pub(crate) fn failure_tail(output: &CommandOutput) -> String {
    let source = if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    let lines: Vec<&str> = source.lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}

/// Decorate a build/compile failure with the usual shell exit-code
/// guidance.
pub(crate) fn attach_exit_hints(err: Error, exit_code: i32) -> Error {
    match exit_code {
        127 => err.with_hint("Exit 127 usually means a command in the build line is not installed"),
        126 => err.with_hint("Exit 126 usually means the build command is not executable"),
        _ => err,
    }
}
