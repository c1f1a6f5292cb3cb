//! Process-wide parameter schema store.
//!
//! The schema is held as a single `Arc<ParameterSchema>` behind a lock that is
//! only ever held long enough to clone or swap the pointer. Readers work on the
//! snapshot they cloned, so a concurrent `replace` can never hand them a mix of
//! old and new ranges.

use soullink_types::ParameterSchema;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared handle to the current parameter schema. Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    // std RwLock: every critical section is a pointer clone or swap and never
    // spans an `.await`.
    current: Arc<RwLock<Arc<ParameterSchema>>>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in a whole new schema. No merging with the previous one.
    pub fn replace(&self, schema: ParameterSchema) {
        let next = Arc::new(schema);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
    }

    /// The schema as of this call.
    pub fn snapshot(&self) -> Arc<ParameterSchema> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Validates candidate parameter values against the current schema.
    ///
    /// Keys unknown to the schema are dropped, values are clamped into range.
    /// An empty schema yields an empty map.
    pub fn clamp_and_filter(&self, candidate: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        clamp_and_filter(&self.snapshot(), candidate)
    }
}

/// Validation against an explicit schema snapshot.
pub fn clamp_and_filter(
    schema: &ParameterSchema,
    candidate: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    candidate
        .iter()
        .filter_map(|(id, value)| {
            let range = schema.get(id)?;
            range.clamp(*value).map(|clamped| (id.clone(), clamped))
        })
        .collect()
}
