//! File-backed collaborators of the enrichment run.
//!
//! - [`load_table`] / [`write_table`]: CSV tables in the legacy or extended layout
//! - [`write_transcript`]: the human-readable run log
//! - [`load_credentials`]: API keys from secret files
//! - [`normalize_table`] and [`select_complete`]: list preparation and
//!   post-run extraction

mod credentials;
mod normalize;
mod schema;
mod select;
mod table;
mod transcript;

pub use credentials::load_credentials;
pub use normalize::{integer_license, normalize_table, row_hash};
pub use schema::TableSchema;
pub use select::{CityQuota, Selection, select_complete};
pub use table::{DerivedColumns, Table, load_table, write_table};
pub use transcript::{
    OutputPaths, RunHeader, TranscriptEntry, render_transcript, write_transcript,
};
