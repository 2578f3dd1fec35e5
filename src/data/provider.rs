//! In-memory reflection-data provider.

use std::collections::HashMap;

use crate::domain::ReflectionSet;
use crate::error::{NemoError, Result};
use crate::prepare::ReflectionProvider;

/// Observation arrays keyed by label.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    sets: HashMap<String, ReflectionSet>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `set` under its own label, replacing any previous array with that label.
    pub fn insert(&mut self, set: ReflectionSet) -> Option<ReflectionSet> {
        self.sets.insert(set.label.clone(), set)
    }

    pub fn with(mut self, set: ReflectionSet) -> Self {
        self.insert(set);
        self
    }

    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.sets.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    /// Parse a JSON array of reflection sets.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let sets: Vec<ReflectionSet> = serde_json::from_str(json)
            .map_err(|e| NemoError::invalid_input(format!("Failed to parse reflection JSON: {e}")))?;
        Ok(sets.into_iter().fold(Self::new(), Self::with))
    }
}

impl ReflectionProvider for InMemoryProvider {
    fn reflection_set(&self, label: &str) -> Result<ReflectionSet> {
        self.sets
            .get(label)
            .cloned()
            .ok_or_else(|| NemoError::MissingObservation(label.to_string()))
    }
}
