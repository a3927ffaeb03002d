use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use serde_json::json;

use bringup::core::manifest::MANIFEST_FILE;

use super::CmdResult;

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing manifest
    #[arg(long)]
    pub force: bool,

    /// Directory to initialize (defaults to the current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOutput {
    pub command: String,
    pub path: String,
    pub created: bool,
}

/// Starter manifest with one feature and one component, edited from
/// there by the platform's developers.
fn starter_manifest() -> serde_json::Value {
    json!({
        "platform": "my-platform",
        "settings": {
            "default_feature": "core",
            "image_prefix": "local",
            "image_tag": "dev",
            "namespace": "develop",
            "work_dir": ".bringup"
        },
        "features": [
            {"id": "core", "components": ["api"]}
        ],
        "components": [
            {
                "id": "api",
                "path": "api",
                "manifest": "kube/develop/api.yaml"
            }
        ]
    })
}

pub fn run(args: InitArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<InitOutput> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| {
            bringup::Error::internal_io(e, Some("resolve current directory".to_string()))
        })?,
    };
    let path = dir.join(MANIFEST_FILE);

    if path.exists() && !args.force {
        return Err(bringup::Error::validation_invalid_argument(
            "dir",
            format!("{} already exists", path.display()),
            Some(path.display().to_string()),
            None,
        )
        .with_hint("Pass --force to overwrite the existing manifest"));
    }

    let content = serde_json::to_string_pretty(&starter_manifest())
        .map_err(|e| bringup::Error::internal_json(e, Some("render starter manifest".to_string())))?;
    std::fs::write(&path, content + "\n")
        .map_err(|e| bringup::Error::internal_io(e, Some(format!("write {}", path.display()))))?;

    Ok((
        InitOutput {
            command: "init.run".to_string(),
            path: path.display().to_string(),
            created: true,
        },
        0,
    ))
}
