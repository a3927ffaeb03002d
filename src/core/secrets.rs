use std::collections::BTreeMap;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use heck::ToShoutySnakeCase;
use serde::Serialize;
use serde_json::Value;

use crate::core::manifest::SecretsConfig;
use crate::core::{Error, Result};

/// Key/value secrets loaded from the platform's local secrets file,
/// keys normalized to env-var style for in-cluster injection.
#[derive(Debug, Clone)]
pub struct SecretBundle {
    pub name: String,
    entries: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct SecretMetadata {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

#[derive(Serialize)]
struct SecretManifest {
    #[serde(rename = "apiVersion")]
    api_version: String,
    kind: String,
    metadata: SecretMetadata,
    #[serde(rename = "type")]
    secret_type: String,
    data: BTreeMap<String, String>,
}

impl SecretBundle {
    pub fn load(config: &SecretsConfig, file_path: &Path) -> Result<Self> {
        let fail = |detail: String| Error::secret_bootstrap_failed(&config.name, detail);

        let content = std::fs::read_to_string(file_path)
            .map_err(|e| fail(format!("read {}: {e}", file_path.display())))?;
        let raw: Value = serde_json::from_str(&content)
            .map_err(|e| fail(format!("parse {}: {e}", file_path.display())))?;
        let obj = raw
            .as_object()
            .ok_or_else(|| fail("secrets file must be a JSON object".to_string()))?;

        let mut entries = BTreeMap::new();
        for (key, value) in obj {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(fail(format!(
                        "value for '{key}' must be a string, number, or bool"
                    )))
                }
            };
            entries.insert(key.to_shouty_snake_case(), value);
        }

        Ok(Self {
            name: config.name.clone(),
            entries,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Render an Opaque Secret manifest consumable by `kubectl apply -f -`.
    pub fn render_manifest(&self, namespace: Option<&str>) -> Result<String> {
        let data = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), general_purpose::STANDARD.encode(v)))
            .collect();

        let manifest = SecretManifest {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            metadata: SecretMetadata {
                name: self.name.clone(),
                namespace: namespace.map(|n| n.to_string()),
            },
            secret_type: "Opaque".to_string(),
            data,
        };

        serde_yml::to_string(&manifest)
            .map_err(|e| Error::secret_bootstrap_failed(&self.name, format!("render: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> SecretsConfig {
        SecretsConfig {
            name: "architus-secrets".to_string(),
            file: "secrets.json".to_string(),
        }
    }

    fn write_secrets(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_and_normalizes_keys() {
        let (_dir, path) =
            write_secrets(r#"{"botToken": "hunter2", "db-password": "s3cret", "shardCount": 2}"#);
        let bundle = SecretBundle::load(&config(), &path).unwrap();
        let keys: Vec<&str> = bundle.keys().collect();
        assert_eq!(keys, vec!["BOT_TOKEN", "DB_PASSWORD", "SHARD_COUNT"]);
    }

    #[test]
    fn renders_opaque_secret_with_base64_values() {
        let (_dir, path) = write_secrets(r#"{"botToken": "hunter2"}"#);
        let bundle = SecretBundle::load(&config(), &path).unwrap();
        let rendered = bundle.render_manifest(Some("develop")).unwrap();

        assert!(rendered.contains("kind: Secret"));
        assert!(rendered.contains("name: architus-secrets"));
        assert!(rendered.contains("namespace: develop"));
        assert!(rendered.contains("type: Opaque"));
        // "hunter2" base64-encoded
        assert!(rendered.contains("BOT_TOKEN"));
        assert!(rendered.contains("aHVudGVyMg=="));
    }

    #[test]
    fn namespace_is_omitted_when_unset() {
        let (_dir, path) = write_secrets(r#"{"a": "b"}"#);
        let bundle = SecretBundle::load(&config(), &path).unwrap();
        let rendered = bundle.render_manifest(None).unwrap();
        assert!(!rendered.contains("namespace:"));
    }

    #[test]
    fn non_object_file_fails_bootstrap() {
        let (_dir, path) = write_secrets(r#"["not", "an", "object"]"#);
        let err = SecretBundle::load(&config(), &path).unwrap_err();
        assert_eq!(err.code, crate::core::ErrorCode::SecretBootstrapFailed);
    }

    #[test]
    fn nested_values_fail_bootstrap() {
        let (_dir, path) = write_secrets(r#"{"oauth": {"id": "x"}}"#);
        let err = SecretBundle::load(&config(), &path).unwrap_err();
        assert_eq!(err.code, crate::core::ErrorCode::SecretBootstrapFailed);
    }

    #[test]
    fn missing_file_fails_bootstrap() {
        let dir = tempdir().unwrap();
        let err = SecretBundle::load(&config(), &dir.path().join("none.json")).unwrap_err();
        assert_eq!(err.code, crate::core::ErrorCode::SecretBootstrapFailed);
    }
}
