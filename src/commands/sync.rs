use std::path::PathBuf;

use clap::Args;

use bringup::core::dispatch::{CycleReport, DispatchOptions};

use super::CmdResult;

#[derive(Args)]
pub struct SyncArgs {
    /// Features whose components should be synced ('all' for every
    /// registered feature)
    pub features: Vec<String>,

    /// Do not implicitly include the default feature
    #[arg(long)]
    pub no_default: bool,

    /// Sync components one at a time
    #[arg(long)]
    pub serial: bool,

    /// Platform directory (defaults to the current directory or git root)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

pub fn run(args: SyncArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<CycleReport> {
    let (platform, enabled) =
        crate::commands::resolve_platform(args.dir.as_deref(), &args.features, args.no_default)?;

    // Sync compiles locally and patches the pod over kubectl; docker
    // is never invoked.
    let needs_cargo = crate::commands::any_hot_reload(&platform, &enabled);
    crate::commands::require_tools(false, needs_cargo)?;

    let dispatcher = crate::commands::dispatcher(
        platform,
        DispatchOptions {
            hot_reload: true,
            dry_run: false,
            serial: args.serial,
        },
    );

    let report = dispatcher.sync_cycle(&enabled)?;
    let exit_code = if report.summary.failed > 0 { 1 } else { 0 };
    Ok((report, exit_code))
}
