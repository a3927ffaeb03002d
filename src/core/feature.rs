use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Reserved feature name meaning "every component reachable from any
/// registered feature".
pub const ALL_SENTINEL: &str = "all";

/// Operator-facing label grouping the components that deliver one
/// capability. Component order is meaningful and preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub components: Vec<String>,
}

/// What the operator asked for, with the sentinel lifted out of the
/// name list so no call site compares against it by string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSelection {
    Explicit(Vec<String>),
    Everything,
}

impl FeatureSelection {
    /// The sentinel wins over everything else in the same request,
    /// including names that are not registered features.
    pub fn from_names(names: &[String]) -> Self {
        if names.iter().any(|n| n == ALL_SENTINEL) {
            return FeatureSelection::Everything;
        }
        FeatureSelection::Explicit(names.to_vec())
    }
}

/// Immutable feature-to-components mapping for one run.
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    features: Vec<Feature>,
}

impl FeatureRegistry {
    pub fn new(features: Vec<Feature>) -> Result<Self> {
        let mut seen: HashSet<&str> = HashSet::new();
        for feature in &features {
            if feature.id == ALL_SENTINEL {
                return Err(Error::manifest_invalid_value(
                    "features",
                    Some(feature.id.clone()),
                    format!("feature id '{ALL_SENTINEL}' is reserved"),
                ));
            }
            if !seen.insert(feature.id.as_str()) {
                return Err(Error::manifest_invalid_value(
                    "features",
                    Some(feature.id.clone()),
                    "duplicate feature id",
                ));
            }
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn feature_ids(&self) -> Vec<String> {
        self.features.iter().map(|f| f.id.clone()).collect()
    }

    /// Union of every registered feature's components, in registry
    /// insertion order with first appearance winning.
    pub fn all_components(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for feature in &self.features {
            for component in &feature.components {
                if seen.insert(component.as_str()) {
                    out.push(component.clone());
                }
            }
        }
        out
    }

    /// Expand a selection into the deduplicated enabled set.
    ///
    /// An unregistered feature name is an error, not a skip: a typo
    /// must not silently bring up a partial environment.
    pub fn components_for(&self, selection: &FeatureSelection) -> Result<Vec<String>> {
        match selection {
            FeatureSelection::Everything => Ok(self.all_components()),
            FeatureSelection::Explicit(ids) => {
                let mut seen: HashSet<String> = HashSet::new();
                let mut out = Vec::new();
                for id in ids {
                    let feature = self
                        .feature(id)
                        .ok_or_else(|| Error::feature_unknown(id, self.feature_ids()))?;
                    for component in &feature.components {
                        if seen.insert(component.clone()) {
                            out.push(component.clone());
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Turns operator input into the enabled set, applying the baseline
/// feature when nothing explicit was requested.
pub struct Resolver<'a> {
    registry: &'a FeatureRegistry,
    default_feature: String,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a FeatureRegistry, default_feature: impl Into<String>) -> Self {
        Self {
            registry,
            default_feature: default_feature.into(),
        }
    }

    /// Empty input resolves to the baseline feature unless suppressed;
    /// suppressed empty input resolves to no components at all.
    pub fn resolve(&self, explicit: &[String], suppress_default: bool) -> Result<Vec<String>> {
        if explicit.is_empty() {
            if suppress_default {
                return Ok(Vec::new());
            }
            return self
                .registry
                .components_for(&FeatureSelection::Explicit(vec![self
                    .default_feature
                    .clone()]));
        }

        self.registry
            .components_for(&FeatureSelection::from_names(explicit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;

    fn feature(id: &str, components: &[&str]) -> Feature {
        Feature {
            id: id.to_string(),
            components: components.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn registry() -> FeatureRegistry {
        FeatureRegistry::new(vec![
            feature("core", &["db", "rabbit", "redis", "shard", "manager", "gateway"]),
            feature("api", &["db", "rabbit", "api"]),
            feature("gateway", &["gateway"]),
            feature("logs", &["logs-ingress", "logs-normalize", "logs-submission"]),
        ])
        .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn selection_lifts_sentinel() {
        assert_eq!(
            FeatureSelection::from_names(&names(&["core"])),
            FeatureSelection::Explicit(names(&["core"]))
        );
        assert_eq!(
            FeatureSelection::from_names(&names(&["all"])),
            FeatureSelection::Everything
        );
        assert_eq!(
            FeatureSelection::from_names(&names(&["logs", "all"])),
            FeatureSelection::Everything
        );
    }

    #[test]
    fn everything_unions_all_features_in_registry_order() {
        let reg = registry();
        let all = reg
            .components_for(&FeatureSelection::Everything)
            .unwrap();
        assert_eq!(
            all,
            names(&[
                "db",
                "rabbit",
                "redis",
                "shard",
                "manager",
                "gateway",
                "api",
                "logs-ingress",
                "logs-normalize",
                "logs-submission"
            ])
        );
    }

    #[test]
    fn sentinel_wins_even_next_to_unknown_names() {
        let reg = registry();
        // "bogus" never reaches lookup once the sentinel is present.
        let via_sentinel = reg
            .components_for(&FeatureSelection::from_names(&names(&["bogus", "all"])))
            .unwrap();
        assert_eq!(via_sentinel, reg.all_components());
    }

    #[test]
    fn explicit_union_dedups_shared_components() {
        let reg = registry();
        let enabled = reg
            .components_for(&FeatureSelection::Explicit(names(&["core", "api"])))
            .unwrap();
        // "db" and "rabbit" appear in both; first appearance wins.
        assert_eq!(
            enabled,
            names(&["db", "rabbit", "redis", "shard", "manager", "gateway", "api"])
        );
    }

    #[test]
    fn empty_selection_is_empty_set() {
        let reg = registry();
        let enabled = reg
            .components_for(&FeatureSelection::Explicit(Vec::new()))
            .unwrap();
        assert!(enabled.is_empty());
    }

    #[test]
    fn unknown_feature_fails_before_any_expansion() {
        let reg = registry();
        let err = reg
            .components_for(&FeatureSelection::Explicit(names(&["core", "bogus"])))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FeatureUnknown);
    }

    #[test]
    fn resolver_defaults_to_baseline_feature() {
        let reg = registry();
        let resolver = Resolver::new(&reg, "core");
        let bare = resolver.resolve(&[], false).unwrap();
        let explicit = resolver.resolve(&names(&["core"]), false).unwrap();
        assert_eq!(bare, explicit);
    }

    #[test]
    fn resolver_suppressed_default_is_empty() {
        let reg = registry();
        let resolver = Resolver::new(&reg, "core");
        assert!(resolver.resolve(&[], true).unwrap().is_empty());
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let err = FeatureRegistry::new(vec![
            feature("core", &["db"]),
            feature("core", &["redis"]),
        ])
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ManifestInvalidValue);
    }

    #[test]
    fn registry_rejects_reserved_sentinel_id() {
        let err = FeatureRegistry::new(vec![feature("all", &["db"])]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ManifestInvalidValue);
    }
}
