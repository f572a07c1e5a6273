//! Declarative project loading.
//!
//! A project file names a set of features, their kinds, their role-keyed
//! parent wiring, and optional expiration policies and hooks:
//!
//! ```yaml
//! name: demo
//! features:
//!   spec:
//!     id: qb_spec
//!     kind: QubitSpectrum
//!     expiration: { policy: timeout, hours: 1 }
//!   rabi:
//!     id: qb_rabi
//!     kind: QubitRabi
//!     parents: { spec: qb_spec }
//! ```
//!
//! Loading is get-or-create against the store and all-or-nothing: every
//! check runs against a staged copy of the graph, and the laboratory is only
//! touched once the whole project resolved.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dysart_core::{ExpirationPolicy, Feature, FeatureGraph, FeatureId};

use crate::error::{ConfigError, EngineError};
use crate::hooks::Attachments;
use crate::lab::Laboratory;
use crate::registry::{HookRegistry, KindRegistry};

/// A parsed project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    /// Client-facing feature name -> declaration, in file order.
    #[serde(default)]
    pub features: IndexMap<String, FeatureConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    /// Persistent identity; defaults to the feature name.
    #[serde(default)]
    pub id: Option<String>,
    pub kind: String,
    /// Role key -> parent feature id.
    #[serde(default)]
    pub parents: IndexMap<String, String>,
    #[serde(default)]
    pub expiration: Option<ExpirationConfig>,
    #[serde(default)]
    pub pre_hook: Option<String>,
    #[serde(default)]
    pub post_hook: Option<String>,
    /// Initial instrument setting overrides.
    #[serde(default)]
    pub settings: IndexMap<String, Value>,
}

impl FeatureConfig {
    pub fn feature_id(&self, name: &str) -> FeatureId {
        FeatureId::new(self.id.as_deref().unwrap_or(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case", deny_unknown_fields)]
pub enum ExpirationConfig {
    AlwaysFresh,
    AlwaysExpired,
    /// Components are summed.
    Timeout {
        #[serde(default)]
        days: f64,
        #[serde(default)]
        hours: f64,
        #[serde(default)]
        minutes: f64,
        #[serde(default)]
        seconds: f64,
    },
    Hook {
        name: String,
    },
}

impl ExpirationConfig {
    /// Resolves the declaration to a policy, looking hooks up by name.
    pub fn to_policy(&self, feature: &str, hooks: &HookRegistry) -> Result<ExpirationPolicy, ConfigError> {
        match self {
            ExpirationConfig::AlwaysFresh => Ok(ExpirationPolicy::AlwaysFresh),
            ExpirationConfig::AlwaysExpired => Ok(ExpirationPolicy::AlwaysExpired),
            ExpirationConfig::Timeout {
                days,
                hours,
                minutes,
                seconds,
            } => {
                let total = days * 86_400.0 + hours * 3_600.0 + minutes * 60.0 + seconds;
                let duration = Duration::try_from_secs_f64(total).map_err(|_| {
                    ConfigError::InvalidExpiration {
                        feature: feature.to_string(),
                        reason: format!("timeout of {total}s is not a valid duration"),
                    }
                })?;
                Ok(ExpirationPolicy::timeout(duration))
            }
            ExpirationConfig::Hook { name } => {
                let hook = hooks
                    .expiration_hook(name)
                    .ok_or_else(|| ConfigError::UnknownHook {
                        feature: feature.to_string(),
                        hook: name.clone(),
                    })?;
                Ok(ExpirationPolicy::Hook {
                    name: name.clone(),
                    hook,
                })
            }
        }
    }
}

impl ProjectConfig {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Checks everything that can be checked without a store: unique ids,
    /// registered kinds and hooks, valid expirations, and parent references
    /// to features declared in this file.
    pub fn validate(&self, kinds: &KindRegistry, hooks: &HookRegistry) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for (name, fc) in &self.features {
            let id = fc.feature_id(name);
            if !ids.insert(id.clone()) {
                return Err(ConfigError::DuplicateId { id: id.to_string() });
            }
            if !kinds.contains(&fc.kind) {
                return Err(ConfigError::UnknownKind {
                    feature: name.clone(),
                    kind: fc.kind.clone(),
                });
            }
            for hook in [&fc.pre_hook, &fc.post_hook].into_iter().flatten() {
                if hooks.refresh_hook(hook).is_none() {
                    return Err(ConfigError::UnknownHook {
                        feature: name.clone(),
                        hook: hook.clone(),
                    });
                }
            }
            if let Some(expiration) = &fc.expiration {
                expiration.to_policy(name, hooks)?;
            }
        }
        for (name, fc) in &self.features {
            for (role, parent) in &fc.parents {
                if !ids.contains(&FeatureId::new(parent.as_str())) {
                    return Err(ConfigError::MissingParent {
                        feature: name.clone(),
                        role: role.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Laboratory {
    /// Replaces the loaded feature set with the project's.
    ///
    /// Features already in the store keep their stored state (results,
    /// override, settings); settings and parent roles declared in the file
    /// are only added where the stored document has none. A stored parent
    /// that differs from the declared one is kept and logged. On error the
    /// laboratory is unchanged.
    pub fn load_project(&mut self, config: &ProjectConfig) -> Result<(), EngineError> {
        config.validate(&self.kinds, &self.hooks)?;

        let mut staged = FeatureGraph::new();
        let mut names = IndexMap::new();
        let mut attachments = HashMap::new();
        let mut created = 0usize;

        for (name, fc) in &config.features {
            let id = fc.feature_id(name);
            let mut feature = match self.store.find_feature(&id)? {
                Some(stored) if stored.kind() != fc.kind => {
                    return Err(ConfigError::KindMismatch {
                        feature: name.clone(),
                        stored: stored.kind().to_string(),
                        declared: fc.kind.clone(),
                    }
                    .into());
                }
                Some(stored) => stored,
                None => {
                    created += 1;
                    Feature::new(id.clone(), fc.kind.clone())
                }
            };

            for (label, value) in &fc.settings {
                if !feature.settings().contains_key(label) {
                    feature.set_setting(label.clone(), value.clone());
                }
            }
            let mut added = IndexMap::new();
            for (role, parent) in &fc.parents {
                let parent = FeatureId::new(parent.as_str());
                match feature.parent_id(role) {
                    None => {
                        added.insert(role.clone(), parent);
                    }
                    Some(stored) if *stored == parent => {}
                    Some(stored) => {
                        tracing::warn!(
                            feature = %id,
                            role = %role,
                            stored = %stored,
                            declared = %parent,
                            "parent role differs from project; keeping stored parent"
                        );
                    }
                }
            }
            feature.merge_parents(added);

            let policy = match &fc.expiration {
                Some(expiration) => expiration.to_policy(name, &self.hooks)?,
                None => ExpirationPolicy::default(),
            };
            staged.insert(feature)?;
            staged.set_policy(&id, policy)?;
            attachments.insert(id.clone(), self.attachments_for(fc));
            names.insert(name.clone(), id);
        }
        staged.validate().map_err(ConfigError::Graph)?;

        for feature in staged.features() {
            self.store.save_feature(feature)?;
        }
        self.graph = staged;
        self.names = names;
        self.attachments = attachments;
        self.project = Some(config.name.clone());
        tracing::info!(
            project = %config.name,
            features = self.graph.len(),
            created,
            "project loaded"
        );
        Ok(())
    }

    pub fn load_project_file(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let config = ProjectConfig::from_path(path)?;
        self.load_project(&config)
    }

    fn attachments_for(&self, fc: &FeatureConfig) -> Attachments {
        Attachments {
            pre_hook: fc.pre_hook.as_deref().and_then(|h| self.hooks.refresh_hook(h)),
            post_hook: fc.post_hook.as_deref().and_then(|h| self.hooks.refresh_hook(h)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dysart_core::CoreError;
    use dysart_storage::{FeatureStore, InMemoryStore, SqliteStore};

    const QUBIT: &str = r#"
name: qubit
features:
  spec:
    id: qb_spec
    kind: QubitSpectrum
    expiration: { policy: timeout, minutes: 30, seconds: 15 }
    post_hook: log
    settings: { points: 401 }
  rabi:
    id: qb_rabi
    kind: QubitRabi
    parents: { spec: qb_spec }
    expiration: { policy: hook, name: always_fresh }
"#;

    fn qubit() -> ProjectConfig {
        ProjectConfig::from_yaml(QUBIT).unwrap()
    }

    #[test]
    fn parses_features_in_file_order() {
        let config = qubit();
        assert_eq!(config.name, "qubit");
        let names: Vec<&str> = config.features.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["spec", "rabi"]);
        assert_eq!(
            config.features["spec"].expiration,
            Some(ExpirationConfig::Timeout {
                days: 0.0,
                hours: 0.0,
                minutes: 30.0,
                seconds: 15.0
            })
        );
        assert_eq!(config.features["rabi"].feature_id("rabi"), FeatureId::new("qb_rabi"));
    }

    #[test]
    fn rejects_unknown_fields_and_policies() {
        assert!(ProjectConfig::from_yaml("name: x\nfeatures:\n  a:\n    kind: Feature\n    colour: red\n").is_err());
        assert!(ProjectConfig::from_yaml(
            "name: x\nfeatures:\n  a:\n    kind: Feature\n    expiration: { policy: sometimes }\n"
        )
        .is_err());
    }

    #[test]
    fn validate_reports_offending_identifier() {
        let kinds = KindRegistry::with_lab_kinds();
        let hooks = HookRegistry::with_builtins();
        let cases = [
            ("name: x\nfeatures:\n  a:\n    kind: Nope\n", "Nope"),
            ("name: x\nfeatures:\n  a:\n    kind: Feature\n    pre_hook: ghost\n", "ghost"),
            ("name: x\nfeatures:\n  a:\n    kind: Feature\n    parents: { up: missing }\n", "missing"),
            ("name: x\nfeatures:\n  a:\n    kind: Feature\n  b:\n    id: a\n    kind: Feature\n", "'a'"),
            (
                "name: x\nfeatures:\n  a:\n    kind: Feature\n    expiration: { policy: timeout, seconds: -5 }\n",
                "timeout",
            ),
        ];
        for (yaml, needle) in cases {
            let err = ProjectConfig::from_yaml(yaml)
                .unwrap()
                .validate(&kinds, &hooks)
                .unwrap_err();
            assert!(err.to_string().contains(needle), "{err} should mention {needle}");
        }
    }

    #[test]
    fn load_creates_features_names_and_edges() {
        let mut lab = Laboratory::in_memory();
        lab.load_project(&qubit()).unwrap();

        assert_eq!(lab.project_name(), Some("qubit"));
        assert_eq!(lab.resolve("rabi").unwrap(), FeatureId::new("qb_rabi"));
        let edges = lab.feature_graph();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].parent, FeatureId::new("qb_spec"));
        assert_eq!(edges[0].role, "spec");
        assert_eq!(lab.store().list_features().unwrap().len(), 2);
        assert_eq!(
            lab.diffs(&FeatureId::new("qb_spec")).unwrap()["points"],
            serde_json::json!(401)
        );
        assert!(lab.attachments[&FeatureId::new("qb_spec")].post_hook.is_some());
        assert!(matches!(
            lab.graph().policy(&FeatureId::new("qb_spec")),
            ExpirationPolicy::Timeout(_)
        ));
    }

    #[test]
    fn cyclic_project_is_rejected_without_changes() {
        let yaml = "name: loop\nfeatures:\n  a:\n    kind: Feature\n    parents: { up: b }\n  b:\n    kind: Feature\n    parents: { up: a }\n";
        let mut lab = Laboratory::in_memory();
        lab.load_project(&qubit()).unwrap();

        let err = lab
            .load_project(&ProjectConfig::from_yaml(yaml).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::Graph(CoreError::CycleDetected { .. }))
        ));
        assert_eq!(lab.project_name(), Some("qubit"));
        assert!(lab.resolve("a").is_err());
        assert!(lab.store().find_feature(&FeatureId::new("a")).unwrap().is_none());
    }

    #[test]
    fn reload_keeps_stored_state_and_parents() {
        let mut store = InMemoryStore::new();
        let mut spec = Feature::new("qb_spec", "QubitSpectrum");
        spec.set_override(true);
        spec.set_setting("points", serde_json::json!(51));
        store.save_feature(&spec).unwrap();
        store.save_feature(&Feature::new("other_spec", "QubitSpectrum")).unwrap();
        let mut rabi = Feature::new("qb_rabi", "QubitRabi");
        rabi.merge_parents([("spec".to_string(), FeatureId::new("other_spec"))]);
        store.save_feature(&rabi).unwrap();

        let yaml = format!(
            "{QUBIT}  other:\n    id: other_spec\n    kind: QubitSpectrum\n"
        );
        let mut lab = Laboratory::with_store(Box::new(store));
        lab.load_project(&ProjectConfig::from_yaml(&yaml).unwrap()).unwrap();

        let spec = lab.feature(&FeatureId::new("qb_spec")).unwrap();
        assert!(spec.is_overridden());
        assert_eq!(spec.settings()["points"], serde_json::json!(51));
        let rabi = lab.feature(&FeatureId::new("qb_rabi")).unwrap();
        assert_eq!(rabi.parent_id("spec"), Some(&FeatureId::new("other_spec")));
    }

    #[test]
    fn kind_mismatch_with_store_is_an_error() {
        let mut store = InMemoryStore::new();
        store.save_feature(&Feature::new("qb_spec", "Feature")).unwrap();
        let mut lab = Laboratory::with_store(Box::new(store));
        let err = lab.load_project(&qubit()).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::KindMismatch { .. })));
        assert!(lab.feature_ids().is_empty());
    }

    #[tokio::test]
    async fn simulated_qubit_end_to_end() {
        let mut lab = Laboratory::with_store(Box::new(SqliteStore::in_memory().unwrap()));
        lab.load_project(&qubit()).unwrap();
        let rabi = lab.resolve("rabi").unwrap();
        let spec = lab.resolve("spec").unwrap();

        let pi_time = lab.accessor(&rabi, "pi_time", -1, None).await.unwrap();
        let pi_time = pi_time.as_f64().unwrap();
        assert!((pi_time - 50.0).abs() < 5.0, "pi_time {pi_time}");

        let center = lab.read_accessor(&spec, "center_freq", -1).unwrap();
        assert!((center.as_f64().unwrap() - 5.02).abs() < 0.002);
        let drive = lab.feature(&rabi).unwrap().last_result("drive_frequency").cloned();
        assert_eq!(drive, Some(center));

        assert_eq!(lab.call_records(&spec).unwrap().len(), 1);
        assert_eq!(lab.call_records(&rabi).unwrap().len(), 1);
    }
}
