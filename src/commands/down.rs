use std::path::PathBuf;

use clap::Args;

use bringup::core::dispatch::{CycleReport, DispatchOptions};

use super::CmdResult;

#[derive(Args)]
pub struct DownArgs {
    /// Features whose components should be torn down ('all' for every
    /// registered feature)
    pub features: Vec<String>,

    /// Do not implicitly include the default feature
    #[arg(long)]
    pub no_default: bool,

    /// Platform directory (defaults to the current directory or git root)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

pub fn run(args: DownArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<CycleReport> {
    let (platform, enabled) =
        crate::commands::resolve_platform(args.dir.as_deref(), &args.features, args.no_default)?;

    crate::commands::require_tools(false, false)?;

    let dispatcher = crate::commands::dispatcher(
        platform,
        DispatchOptions {
            hot_reload: false,
            dry_run: false,
            serial: false,
        },
    );

    let report = dispatcher.down(&enabled)?;
    let exit_code = if report.summary.failed > 0 { 1 } else { 0 };
    Ok((report, exit_code))
}
