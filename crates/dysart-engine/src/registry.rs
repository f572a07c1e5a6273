//! Name -> implementation registries for kinds and hooks.
//!
//! Project files refer to kinds and hooks by name. Each registry maps those
//! names to implementations and, for kinds, to the explicit list of methods
//! a feature of that kind exposes to remote callers.

use std::collections::HashMap;
use std::sync::Arc;

use dysart_core::{ExpirationHook, ExpirationInput, ExpirationStatus};

use crate::hooks::{LogHook, NamedHook, RefreshHook};
use crate::kind::{FeatureKind, MethodSpec, BUILTIN_METHODS};
use crate::kinds::{BaseFeature, QubitRabi, QubitSpectrum};

/// A kind plus the method list computed when it was registered.
#[derive(Clone)]
pub struct RegisteredKind {
    pub kind: Arc<dyn FeatureKind>,
    pub methods: Vec<MethodSpec>,
}

impl RegisteredKind {
    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Kinds available to project files.
#[derive(Clone)]
pub struct KindRegistry {
    kinds: HashMap<String, RegisteredKind>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KindRegistry {
    /// A registry holding only the base `Feature` kind.
    pub fn new() -> Self {
        let mut registry = KindRegistry {
            kinds: HashMap::new(),
        };
        registry.register(BaseFeature);
        registry
    }

    /// The base kind plus the simulated qubit kinds.
    pub fn with_lab_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(QubitSpectrum);
        registry.register(QubitRabi);
        registry
    }

    /// Registers (or replaces) a kind under its own name.
    pub fn register(&mut self, kind: impl FeatureKind + 'static) {
        self.register_arc(Arc::new(kind));
    }

    pub fn register_arc(&mut self, kind: Arc<dyn FeatureKind>) {
        let methods = BUILTIN_METHODS
            .iter()
            .copied()
            .chain(kind.accessors().iter().map(|&name| MethodSpec::accessor(name)))
            .collect();
        self.kinds
            .insert(kind.name().to_string(), RegisteredKind { kind, methods });
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredKind> {
        self.kinds.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Registered kind names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn always_fresh(_: &ExpirationInput<'_>) -> ExpirationStatus {
    ExpirationStatus::Fresh
}

fn always_expired(_: &ExpirationInput<'_>) -> ExpirationStatus {
    ExpirationStatus::Expired
}

/// Refresh and expiration hooks available to project files.
#[derive(Clone, Default)]
pub struct HookRegistry {
    refresh: HashMap<String, Arc<dyn RefreshHook>>,
    expiration: HashMap<String, Arc<dyn ExpirationHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `log` refresh hook plus the `always_fresh` / `always_expired`
    /// expiration hooks.
    pub fn with_builtins() -> Self {
        let mut hooks = Self::new();
        hooks.register_refresh("log", LogHook);
        hooks.register_expiration("always_fresh", always_fresh);
        hooks.register_expiration("always_expired", always_expired);
        hooks
    }

    pub fn register_refresh(&mut self, name: impl Into<String>, hook: impl RefreshHook + 'static) {
        self.refresh.insert(name.into(), Arc::new(hook));
    }

    pub fn register_expiration(
        &mut self,
        name: impl Into<String>,
        hook: impl ExpirationHook + 'static,
    ) {
        self.expiration.insert(name.into(), Arc::new(hook));
    }

    pub fn refresh_hook(&self, name: &str) -> Option<NamedHook> {
        self.refresh.get(name).map(|hook| NamedHook {
            name: name.to_string(),
            hook: hook.clone(),
        })
    }

    pub fn expiration_hook(&self, name: &str) -> Option<Arc<dyn ExpirationHook>> {
        self.expiration.get(name).cloned()
    }
}
