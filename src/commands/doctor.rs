use std::path::PathBuf;

use clap::Args;

use bringup::core::manifest::Platform;
use bringup::core::preflight::{self, FailOn, PreflightReport, PreflightSeverity};

use super::CmdResult;

#[derive(Args)]
pub struct DoctorArgs {
    /// Exit non-zero on warnings, not just errors
    #[arg(long)]
    pub fail_on_warnings: bool,

    /// Platform directory (defaults to the current directory or git root)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

fn fail_on(args: &DoctorArgs) -> FailOn {
    if args.fail_on_warnings {
        FailOn::Warning
    } else {
        FailOn::Error
    }
}

pub fn run(args: DoctorArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PreflightReport> {
    let platform = Platform::load(args.dir.as_deref())?;
    let report = preflight::run(&platform);
    let exit_code = preflight::exit_code(&report, fail_on(&args));
    Ok((report, exit_code))
}

pub fn run_raw(
    args: DoctorArgs,
    global: &crate::commands::GlobalArgs,
) -> bringup::Result<(String, i32)> {
    let (report, exit_code) = run(args, global)?;

    let mut out = String::new();
    out.push_str(&format!(
        "{}: {} checks, {} error(s), {} warning(s)\n",
        report.platform,
        report.summary.checks_run,
        report.summary.issues.get("error").copied().unwrap_or(0),
        report.summary.issues.get("warning").copied().unwrap_or(0),
    ));
    for issue in &report.issues {
        let severity = match issue.severity {
            PreflightSeverity::Error => "ERROR",
            PreflightSeverity::Warning => "WARNING",
            PreflightSeverity::Info => "INFO",
        };
        out.push_str(&format!(
            "{} {} {}: {}\n",
            severity, issue.code, issue.subject, issue.message
        ));
    }

    Ok((out, exit_code))
}
