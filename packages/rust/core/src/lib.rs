//! Enrichment logic for MedContact.
//!
//! Leaves first: [`parser`] pulls the JSON object out of provider text,
//! [`prompt`] renders requests from [`rounds`], [`merge`] decides which values
//! survive, [`engine`] runs the round table for one record, [`orchestrator`]
//! spreads records over credentials, and [`pipeline`] wires it all to files.

pub mod engine;
pub mod merge;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod rounds;

#[cfg(test)]
mod testing;

pub use engine::{EnrichmentEngine, RecordResult, RoundOutcome, RoundReport};
pub use merge::{CompletenessScore, FieldChange, LengthScore, MergePolicy};
pub use orchestrator::{BatchProgress, Orchestrator, SilentProgress, chunk_size};
pub use pipeline::{BatchConfig, BatchSummary, run_batch, run_batch_with};
pub use rounds::{RoundDescriptor, RoundKind, round_table};
