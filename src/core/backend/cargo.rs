use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;

use crate::core::backend::{attach_exit_hints, failure_tail, LocalCompileRequest};
use crate::core::component::{ComponentDescriptor, HotReloadSpec};
use crate::core::exec;
use crate::core::manifest::Platform;
use crate::core::{Error, Result};

#[derive(Deserialize)]
struct BuildTargetManifest {
    package: Option<BuildTargetPackage>,
}

#[derive(Deserialize)]
struct BuildTargetPackage {
    name: String,
}

/// Package name of a hot-reload build target, read from the target's
/// own `Cargo.toml`. Used to derive the build command and binary path
/// when the descriptor does not spell them out.
pub fn package_name(platform: &Platform, descriptor: &ComponentDescriptor) -> Result<String> {
    let hot = descriptor.hot_reload.as_ref().ok_or_else(|| {
        Error::internal_unexpected(format!(
            "component '{}' has no hot-reload spec",
            descriptor.id
        ))
    })?;

    let key = format!("components.{}.hot_reload.build_target", descriptor.id);
    let manifest_path = platform.resolve_path(&hot.build_target).join("Cargo.toml");

    let content = std::fs::read_to_string(&manifest_path).map_err(|_| {
        Error::manifest_invalid_value(
            &key,
            Some(hot.build_target.clone()),
            format!("no readable Cargo.toml at {}", manifest_path.display()),
        )
    })?;

    let parsed: BuildTargetManifest = toml::from_str(&content).map_err(|e| {
        Error::manifest_invalid_value(
            &key,
            Some(hot.build_target.clone()),
            format!("invalid Cargo.toml: {e}"),
        )
    })?;

    parsed.package.map(|p| p.name).ok_or_else(|| {
        Error::manifest_invalid_value(
            &key,
            Some(hot.build_target.clone()),
            "Cargo.toml has no [package] section",
        )
    })
}

pub fn default_build_command(package: &str) -> String {
    format!("cargo build -p {package}")
}

/// Debug binary path for a package, relative to the platform root.
pub fn derived_binary(package: &str) -> PathBuf {
    Path::new("target").join("debug").join(package)
}

/// Every file whose change must trigger recompilation: the build
/// target's own tree, its build descriptor, each locally-built
/// dependency path, and each watched glob's matches.
pub fn collect_triggers(
    platform: &Platform,
    hot: &HotReloadSpec,
) -> Vec<PathBuf> {
    let mut triggers = Vec::new();

    let target_dir = platform.resolve_path(&hot.build_target);
    triggers.push(target_dir.join("Cargo.toml"));
    triggers.push(target_dir);

    for dep in &hot.local_deps {
        triggers.push(platform.resolve_path(dep));
    }

    for pattern in &hot.watch {
        let absolute = platform.resolve_path(pattern);
        match glob::glob(&absolute.to_string_lossy()) {
            Ok(paths) => triggers.extend(paths.flatten()),
            Err(_) => triggers.push(absolute),
        }
    }

    triggers
}

/// Whether any trigger is newer than the compiled binary. A missing
/// binary is always stale.
pub fn is_stale(binary: &Path, triggers: &[PathBuf]) -> bool {
    let Some(binary_mtime) = mtime(binary) else {
        return true;
    };

    triggers
        .iter()
        .filter_map(|t| newest_mtime(t))
        .any(|t| t > binary_mtime)
}

fn mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// Newest mtime under a path. Build output and VCS metadata are not
/// source changes, so `target` and `.git` subtrees are ignored.
fn newest_mtime(path: &Path) -> Option<SystemTime> {
    if path.is_file() {
        return mtime(path);
    }

    let mut newest: Option<SystemTime> = None;
    let entries = std::fs::read_dir(path).ok()?;
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            let name = entry.file_name();
            if name == "target" || name == ".git" {
                continue;
            }
        }
        if let Some(t) = newest_mtime(&entry_path) {
            newest = Some(match newest {
                Some(n) if n >= t => n,
                _ => t,
            });
        }
    }
    newest
}

/// Run a local compilation. Fresh binaries (no trigger newer than the
/// output) skip the build entirely.
pub fn compile(req: &LocalCompileRequest) -> Result<()> {
    if !is_stale(&req.binary, &req.triggers) {
        crate::log_status!("build", "{}: binary is up to date, skipping compile", req.component_id);
        return Ok(());
    }

    crate::log_status!("build", "{}: {}", req.component_id, req.command);

    let output = exec::run_shell(&req.command, Some(&req.workdir), &req.env)?;
    if !output.success {
        let err = Error::build_compile_failed(
            &req.component_id,
            &req.command,
            Some(output.exit_code),
            Some(failure_tail(&output)),
        );
        return Err(attach_exit_hints(err, output.exit_code));
    }

    if !req.binary.exists() {
        return Err(Error::build_compile_failed(
            &req.component_id,
            &req.command,
            Some(output.exit_code),
            Some(format!(
                "build succeeded but produced no binary at {}",
                req.binary.display()
            )),
        ));
    }

    Ok(())
}
