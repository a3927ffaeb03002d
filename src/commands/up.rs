use std::path::PathBuf;

use clap::Args;

use bringup::core::dispatch::{DispatchOptions, UpReport};

use super::CmdResult;

#[derive(Args)]
pub struct UpArgs {
    /// Features to enable ('all' for every registered feature).
    /// The default feature is added unless --no-default is set.
    pub features: Vec<String>,

    /// Do not implicitly enable the default feature
    #[arg(long)]
    pub no_default: bool,

    /// Use the hot-reload pipeline for components that support it
    #[arg(long)]
    pub hot_reload: bool,

    /// Run component pipelines one at a time
    #[arg(long)]
    pub serial: bool,

    /// Resolve and plan without touching docker or the cluster
    #[arg(long)]
    pub dry_run: bool,

    /// Platform directory (defaults to the current directory or git root)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

pub fn run(args: UpArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<UpReport> {
    let (platform, enabled) =
        crate::commands::resolve_platform(args.dir.as_deref(), &args.features, args.no_default)?;

    if !args.dry_run {
        let needs_cargo =
            args.hot_reload && crate::commands::any_hot_reload(&platform, &enabled);
        crate::commands::require_tools(true, needs_cargo)?;
    }

    let dispatcher = crate::commands::dispatcher(
        platform,
        DispatchOptions {
            hot_reload: args.hot_reload,
            dry_run: args.dry_run,
            serial: args.serial,
        },
    );

    let report = dispatcher.up(&enabled)?;
    let exit_code = if report.summary.failed > 0 { 1 } else { 0 };
    Ok((report, exit_code))
}
