//! Field merge policy.
//!
//! A candidate value replaces the current one only when it is non-empty and
//! either the current value is empty or the candidate scores strictly higher.
//! Merging therefore never blanks a field, and feeding a record its own
//! values changes nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use medcontact_shared::{Field, Record};
use tracing::trace;

/// Ranks how complete a value looks. Higher is better.
pub trait CompletenessScore: Send + Sync {
    fn score(&self, field: Field, value: &str) -> usize;
}

/// Longer values win: `"São Paulo"` beats `"SP"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthScore;

impl CompletenessScore for LengthScore {
    fn score(&self, _field: Field, value: &str) -> usize {
        value.trim().chars().count()
    }
}

/// A field the merge overwrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: Field,
    pub previous: String,
    pub value: String,
}

/// Applies parsed provider output to a record.
#[derive(Clone)]
pub struct MergePolicy {
    scorer: Arc<dyn CompletenessScore>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(LengthScore)
    }
}

impl std::fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergePolicy").finish_non_exhaustive()
    }
}

impl MergePolicy {
    pub fn new(scorer: impl CompletenessScore + 'static) -> Self {
        Self {
            scorer: Arc::new(scorer),
        }
    }

    /// Merge `parsed` into `record`, returning the fields that changed.
    ///
    /// Keys resolve through the alias table. Unknown keys and fields that are
    /// not enrichment targets are ignored.
    pub fn merge(&self, record: &mut Record, parsed: &BTreeMap<String, String>) -> Vec<FieldChange> {
        let mut changes: Vec<FieldChange> = Vec::new();

        for (key, raw) in parsed {
            let Some(field) = Field::from_alias(key) else {
                trace!(%key, "ignoring unknown key");
                continue;
            };
            if !field.is_enrichable() {
                trace!(%field, "ignoring non-enrichable field");
                continue;
            }

            let candidate = raw.trim();
            if !self.should_replace(field, record.get(field), candidate) {
                continue;
            }

            let previous = record.get(field).to_string();
            record.set(field, candidate);

            match changes.iter_mut().find(|c| c.field == field) {
                Some(change) => change.value = candidate.to_string(),
                None => changes.push(FieldChange {
                    field,
                    previous,
                    value: candidate.to_string(),
                }),
            }
        }

        changes.sort_by_key(|c| c.field);
        changes
    }

    fn should_replace(&self, field: Field, current: &str, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        let current = current.trim();
        current.is_empty()
            || self.scorer.score(field, candidate) > self.scorer.score(field, current)
    }
}
