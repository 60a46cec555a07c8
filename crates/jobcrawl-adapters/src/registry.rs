use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    AshbyAdapter, GreenhouseAdapter, LeverAdapter, RecruiteeAdapter, SourceAdapter, WorkableAdapter,
};

/// Lowercases a label and strips separators so `Green-House` and `greenhouse` match.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect()
}

/// Maps normalized label keys to adapters.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("keys", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let ashby: Arc<dyn SourceAdapter> = Arc::new(AshbyAdapter);
        registry.register("greenhouse", Arc::new(GreenhouseAdapter));
        registry.register("lever", Arc::new(LeverAdapter));
        registry.register("ashby", ashby.clone());
        registry.register("ashbyhq", ashby);
        registry.register("recruitee", Arc::new(RecruiteeAdapter));
        registry.register("workable", Arc::new(WorkableAdapter));
        registry
    }

    pub fn register(&mut self, key: &str, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(normalize_label(key), adapter);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Resolves a directory label to an adapter.
    ///
    /// Exact match on the normalized label first. Otherwise every key that
    /// contains the label or is contained in it is a candidate, and the
    /// shortest candidate wins (lexically first on ties).
    pub fn resolve(&self, label: &str) -> Option<(&str, Arc<dyn SourceAdapter>)> {
        let wanted = normalize_label(label);
        if wanted.is_empty() {
            return None;
        }
        if let Some((key, adapter)) = self.adapters.get_key_value(&wanted) {
            return Some((key.as_str(), adapter.clone()));
        }

        self.adapters
            .iter()
            .filter(|(key, _)| wanted.contains(key.as_str()) || key.contains(wanted.as_str()))
            .min_by_key(|(key, _)| key.len())
            .map(|(key, adapter)| (key.as_str(), adapter.clone()))
    }
}
