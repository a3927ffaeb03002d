use std::path::Path;
use std::sync::Arc;

use bringup::core::backend::{ClusterBackend, SyncBackend};
use bringup::core::backend::docker::DockerBackend;
use bringup::core::backend::kubectl::KubectlBackend;
use bringup::core::dispatch::{DispatchOptions, Dispatcher};
use bringup::core::feature::Resolver;
use bringup::core::manifest::Platform;
use bringup::core::preflight;

pub type CmdResult<T> = bringup::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod doctor;
pub mod down;
pub mod features;
pub mod init;
pub mod sync;
pub mod up;

/// Load the platform and resolve the enabled component set from the
/// feature arguments shared by up, sync, and down.
pub(crate) fn resolve_platform(
    dir: Option<&Path>,
    features: &[String],
    no_default: bool,
) -> bringup::Result<(Platform, Vec<String>)> {
    let platform = Platform::load(dir)?;
    let registry = platform.registry()?;
    let resolver = Resolver::new(&registry, &platform.settings().default_feature);
    let enabled = resolver.resolve(features, no_default)?;
    Ok((platform, enabled))
}

pub(crate) fn any_hot_reload(platform: &Platform, enabled: &[String]) -> bool {
    enabled.iter().any(|id| {
        platform
            .manifest
            .descriptor(id)
            .map(|c| c.supports_hot_reload())
            .unwrap_or(false)
    })
}

pub(crate) fn dispatcher(platform: Platform, options: DispatchOptions) -> Dispatcher {
    let build = Arc::new(DockerBackend::new(&platform));
    let kube = Arc::new(KubectlBackend::new(&platform));
    let cluster: Arc<dyn ClusterBackend> = kube.clone();
    let sync: Arc<dyn SyncBackend> = kube;
    Dispatcher::new(platform, build, cluster, sync, options)
}

/// Hard tool gate shared by the dispatching commands. Dry runs touch
/// no tools and skip it; teardown needs only kubectl.
pub(crate) fn require_tools(needs_docker: bool, needs_cargo: bool) -> bringup::Result<()> {
    preflight::require_tools(needs_docker, needs_cargo)
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (bringup::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Up(args) => dispatch!(args, global, up),
        crate::Commands::Sync(args) => dispatch!(args, global, sync),
        crate::Commands::Down(args) => dispatch!(args, global, down),
        crate::Commands::Features(args) => dispatch!(args, global, features),
        crate::Commands::Doctor(args) => dispatch!(args, global, doctor),
        crate::Commands::Init(args) => dispatch!(args, global, init),
    }
}

pub(crate) fn run_raw(
    command: crate::Commands,
    global: &GlobalArgs,
) -> bringup::Result<(String, i32)> {
    match command {
        crate::Commands::Features(args) => features::run_raw(args, global),
        crate::Commands::Doctor(args) => doctor::run_raw(args, global),
        _ => Err(bringup::Error::validation_invalid_argument(
            "raw",
            "Command does not support raw output",
            None,
            None,
        )),
    }
}
