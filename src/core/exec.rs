use std::path::Path;
use std::process::{Command, Stdio};

use crate::core::{Error, Result};

/// Captured output of a finished local command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Run a full command line through the platform shell, capturing output.
pub fn run_shell(
    command: &str,
    cwd: Option<&Path>,
    envs: &[(String, String)],
) -> Result<CommandOutput> {
    let mut cmd = shell_command(command);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd.output().map_err(|e| {
        Error::internal_io(e, Some(format!("Failed to execute command: {command}")))
    })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Spawn a command line through the platform shell and leave it running.
/// Stdio is detached; the child outlives this process. Returns the pid.
pub fn spawn_shell_detached(command: &str) -> Result<u32> {
    let mut cmd = shell_command(command);

    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            Error::internal_io(e, Some(format!("Failed to spawn command: {command}")))
        })?;

    Ok(child.id())
}

/// Run a tool directly (no shell), returning trimmed stdout on success.
pub fn run_tool(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| {
        Error::internal_io(e, Some(format!("Failed to execute {program}")))
    })?;

    if !output.status.success() {
        return Err(Error::internal_unexpected(format!(
            "{program} {} failed: {}",
            args.join(" "),
            error_text(
                &String::from_utf8_lossy(&output.stderr),
                &String::from_utf8_lossy(&output.stdout)
            )
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Like [`run_tool`] but collapses every failure to `None`.
pub fn run_tool_optional(program: &str, args: &[&str], cwd: Option<&Path>) -> Option<String> {
    run_tool(program, args, cwd).ok()
}

/// Prefer stderr for error reporting, falling back to stdout.
pub fn error_text(stderr: &str, stdout: &str) -> String {
    let err = stderr.trim();
    if !err.is_empty() {
        return err.to_string();
    }
    stdout.trim().to_string()
}
