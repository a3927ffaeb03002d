use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use bringup::core::feature::{FeatureSelection, ALL_SENTINEL};
use bringup::core::manifest::Platform;

use super::CmdResult;

#[derive(Args)]
pub struct FeaturesArgs {
    /// Platform directory (defaults to the current directory or git root)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureInfo {
    pub id: String,
    pub components: Vec<String>,
    pub default: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureListing {
    pub command: String,
    pub platform: String,
    pub default_feature: String,
    pub features: Vec<FeatureInfo>,
    /// Union of every feature's components, what 'all' resolves to.
    pub all_components: Vec<String>,
}

pub fn run(args: FeaturesArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<FeatureListing> {
    let platform = Platform::load(args.dir.as_deref())?;
    let registry = platform.registry()?;
    let default_feature = platform.settings().default_feature.clone();

    let features = registry
        .features()
        .iter()
        .map(|f| FeatureInfo {
            id: f.id.clone(),
            components: f.components.clone(),
            default: f.id == default_feature,
        })
        .collect();

    let all_components = registry.components_for(&FeatureSelection::Everything)?;

    Ok((
        FeatureListing {
            command: "features.list".to_string(),
            platform: platform.manifest.platform.clone(),
            default_feature,
            features,
            all_components,
        },
        0,
    ))
}

pub fn run_raw(
    args: FeaturesArgs,
    global: &crate::commands::GlobalArgs,
) -> bringup::Result<(String, i32)> {
    let (listing, exit_code) = run(args, global)?;

    let mut out = String::new();
    for feature in &listing.features {
        let marker = if feature.default { " (default)" } else { "" };
        out.push_str(&format!(
            "{}{}: {}\n",
            feature.id,
            marker,
            feature.components.join(", ")
        ));
    }
    out.push_str(&format!(
        "{}: {}\n",
        ALL_SENTINEL,
        listing.all_components.join(", ")
    ));

    Ok((out, exit_code))
}
