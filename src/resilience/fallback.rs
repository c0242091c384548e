//! Fallback Router
//!
//! Picks the next model to try when the current one cannot serve a
//! request. Chains come from the [`ModelRegistry`] and may contain cycles;
//! traversal stays finite because a model already in the request's
//! [`AttemptedModels`] is never returned.
//!
//! A request's route is depth-first: the most recently failed model's chain
//! is consulted first, and once it is exhausted the route resumes with the
//! remaining candidates of the models tried before it.

use std::sync::Arc;

use serde::Serialize;

use super::registry::ModelRegistry;

/// Models already tried for one top-level request, in attempt order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttemptedModels(Vec<String>);

impl AttemptedModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// New set containing `model_id` in addition to everything here
    pub fn with(&self, model_id: &str) -> Self {
        let mut models = self.0.clone();
        if !self.contains(model_id) {
            models.push(model_id.to_string());
        }
        Self(models)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.0.iter().any(|m| m == model_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Chooses the next untried model from a fallback chain
#[derive(Clone)]
pub struct FallbackRouter {
    registry: Arc<ModelRegistry>,
}

impl FallbackRouter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// First model in `model_id`'s chain that is not in `attempted`
    pub fn next_fallback<'a>(
        &'a self,
        model_id: &str,
        attempted: &AttemptedModels,
    ) -> Option<&'a str> {
        self.registry
            .fallback_chain(model_id)
            .iter()
            .map(String::as_str)
            .find(|candidate| !attempted.contains(candidate))
    }

    /// Next model on the request's route, backtracking through the chains
    /// of earlier attempts once the latest one's chain is exhausted
    pub fn next_untried<'a>(&'a self, attempted: &AttemptedModels) -> Option<&'a str> {
        attempted
            .as_slice()
            .iter()
            .rev()
            .find_map(|failed| self.next_fallback(failed, attempted))
    }

    /// Order in which models would be tried if every one of them failed
    pub fn walk(&self, model_id: &str) -> Vec<String> {
        let mut attempted = AttemptedModels::new().with(model_id);

        while let Some(next) = self.next_untried(&attempted) {
            attempted = attempted.with(next);
        }

        attempted.into_vec()
    }
}
