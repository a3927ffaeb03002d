use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::component::ComponentDescriptor;
use crate::core::feature::{Feature, FeatureRegistry};
use crate::core::{Error, Result};

/// Portable platform manifest, checked in at the platform repo root.
pub const MANIFEST_FILE: &str = "bringup.json";

/// Cluster secret bootstrapped once per run from a local key/value file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Secret resource name in the cluster.
    pub name: String,
    /// Key/value JSON file relative to the platform root. Git-ignored.
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Feature resolved when the operator names none.
    #[serde(default = "default_feature")]
    pub default_feature: String,
    /// Image registry prefix for component image refs.
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,
    /// Tag applied to locally-built component images.
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
    /// Scratch directory for generated build inputs, relative to the
    /// platform root. Git-ignored.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<SecretsConfig>,
}

fn default_feature() -> String {
    "core".to_string()
}

fn default_image_prefix() -> String {
    "local".to_string()
}

fn default_image_tag() -> String {
    "dev".to_string()
}

fn default_work_dir() -> String {
    ".bringup".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_feature: default_feature(),
            image_prefix: default_image_prefix(),
            image_tag: default_image_tag(),
            namespace: None,
            kube_context: None,
            work_dir: default_work_dir(),
            secrets: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformManifest {
    pub platform: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
}

impl PlatformManifest {
    /// Build the immutable feature registry for this run.
    pub fn registry(&self) -> Result<FeatureRegistry> {
        FeatureRegistry::new(self.features.clone())
    }

    pub fn descriptor(&self, id: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Fail-fast structural validation, run at load time before any
    /// backend is touched.
    pub fn validate(&self) -> Result<()> {
        if self.platform.trim().is_empty() {
            return Err(Error::manifest_invalid_value(
                "platform",
                None,
                "platform name must not be empty",
            ));
        }

        // Also rejects duplicate and reserved feature ids.
        let registry = self.registry()?;

        let mut seen: Vec<&str> = Vec::new();
        for component in &self.components {
            if component.id.trim().is_empty() {
                return Err(Error::manifest_invalid_value(
                    "components",
                    None,
                    "component id must not be empty",
                ));
            }
            if seen.contains(&component.id.as_str()) {
                return Err(Error::manifest_invalid_value(
                    "components",
                    Some(component.id.clone()),
                    "duplicate component id",
                ));
            }
            seen.push(&component.id);

            let key = |field: &str| format!("components.{}.{}", component.id, field);
            if component.path.trim().is_empty() {
                return Err(Error::manifest_invalid_value(
                    key("path"),
                    None,
                    "source path must not be empty",
                ));
            }
            if component.manifest.trim().is_empty() {
                return Err(Error::manifest_invalid_value(
                    key("manifest"),
                    None,
                    "deploy manifest path must not be empty",
                ));
            }
            if let Some(hot) = &component.hot_reload {
                if hot.build_target.trim().is_empty() {
                    return Err(Error::manifest_invalid_value(
                        key("hot_reload.build_target"),
                        None,
                        "build target must not be empty",
                    ));
                }
                if hot.dockerfile.trim().is_empty() {
                    return Err(Error::manifest_invalid_value(
                        key("hot_reload.dockerfile"),
                        None,
                        "runtime dockerfile must not be empty",
                    ));
                }
            }
        }

        // Every component a feature names must have a descriptor.
        for feature in registry.features() {
            for component_id in &feature.components {
                if self.descriptor(component_id).is_none() {
                    return Err(Error::component_unknown(
                        component_id,
                        Some(feature.id.clone()),
                    ));
                }
            }
        }

        if !self.features.is_empty()
            && registry.feature(&self.settings.default_feature).is_none()
        {
            return Err(Error::manifest_invalid_value(
                "settings.default_feature",
                Some(self.settings.default_feature.clone()),
                "not a registered feature",
            ));
        }

        Ok(())
    }
}

/// A loaded platform: the manifest plus the root it was found in.
/// Immutable for the lifetime of one invocation.
#[derive(Debug, Clone)]
pub struct Platform {
    pub root: PathBuf,
    pub manifest: PlatformManifest,
}

impl Platform {
    /// Load and validate the platform manifest.
    ///
    /// Resolution order:
    /// 1. Explicit `dir` → `<dir>/bringup.json` must exist
    /// 2. No `dir` → `bringup.json` in the current directory
    /// 3. Still no match → `bringup.json` at the git root (covers
    ///    running from a component subdirectory)
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = dir {
            let root = expand_dir(dir);
            let path = root.join(MANIFEST_FILE);
            if !path.exists() {
                return Err(Error::manifest_not_found(vec![path.display().to_string()]));
            }
            return Self::load_from(&root);
        }

        let cwd = std::env::current_dir().map_err(|e| {
            Error::internal_io(e, Some("resolve current directory".to_string()))
        })?;

        let mut searched = Vec::new();

        let local = cwd.join(MANIFEST_FILE);
        if local.exists() {
            return Self::load_from(&cwd);
        }
        searched.push(local.display().to_string());

        if let Some(git_root) = detect_git_root(&cwd) {
            if git_root != cwd {
                let at_root = git_root.join(MANIFEST_FILE);
                if at_root.exists() {
                    return Self::load_from(&git_root);
                }
                searched.push(at_root.display().to_string());
            }
        }

        Err(Error::manifest_not_found(searched))
    }

    fn load_from(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::internal_io(e, Some(format!("read {}", path.display())))
        })?;

        let manifest: PlatformManifest = serde_json::from_str(&content)
            .map_err(|e| Error::manifest_invalid_json(path.display().to_string(), e))?;

        manifest.validate()?;

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.manifest.settings
    }

    /// Scratch directory for generated build inputs.
    pub fn work_dir(&self) -> PathBuf {
        self.resolve_path(&self.manifest.settings.work_dir)
    }

    /// Resolve a manifest path against the platform root. Absolute and
    /// tilde paths are honored as written.
    pub fn resolve_path(&self, value: &str) -> PathBuf {
        let expanded = shellexpand::tilde(value).to_string();
        let path = Path::new(&expanded);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.root.join(path)
    }

    pub fn descriptor(&self, id: &str) -> Result<&ComponentDescriptor> {
        self.manifest
            .descriptor(id)
            .ok_or_else(|| Error::component_unknown(id, None))
    }

    pub fn registry(&self) -> Result<FeatureRegistry> {
        self.manifest.registry()
    }
}

fn expand_dir(dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(&dir.to_string_lossy().to_string()).to_string();
    PathBuf::from(expanded)
}

/// Find the git root directory for a given path.
fn detect_git_root(dir: &Path) -> Option<PathBuf> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(dir)
        .output()
        .ok()?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    None
}
