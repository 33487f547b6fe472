//! Human-readable processing transcript and output file naming.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use medcontact_shared::{Field, FieldProvenance, MedContactError, Result};
use tracing::info;
use uuid::Uuid;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Enriched table and transcript paths for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub table: PathBuf,
    pub transcript: PathBuf,
}

impl OutputPaths {
    /// `enriched_<YYYYMMDD_HHMMSS>.csv` and `.txt` under `dir`.
    pub fn new(dir: &Path, at: DateTime<Local>) -> Self {
        let stem = format!("enriched_{}", at.format("%Y%m%d_%H%M%S"));
        Self {
            table: dir.join(format!("{stem}.csv")),
            transcript: dir.join(format!("{stem}.txt")),
        }
    }
}

/// Run-level header.
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// One record's section of the transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub label: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// Non-empty fields after processing, in field order.
    pub fields: Vec<(Field, String)>,
    pub provenance: Vec<FieldProvenance>,
    pub error: Option<String>,
}

/// Render the full transcript text into `out`.
pub fn render_transcript(
    out: &mut impl Write,
    header: &RunHeader,
    entries: &[TranscriptEntry],
) -> std::fmt::Result {
    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    let total = seconds_between(header.started_at, header.finished_at);

    writeln!(out, "MedContact enrichment transcript")?;
    writeln!(out, "Run:      {}", header.run_id)?;
    writeln!(out, "Started:  {}", header.started_at.format(TIME_FORMAT))?;
    writeln!(out, "Finished: {}", header.finished_at.format(TIME_FORMAT))?;
    writeln!(out, "Total:    {total:.2}s")?;
    writeln!(
        out,
        "Records:  {} ({} ok, {failed} failed)",
        entries.len(),
        entries.len() - failed
    )?;

    for entry in entries {
        writeln!(out)?;
        writeln!(out, "=== {} ===", entry.label)?;
        writeln!(out, "Started:  {}", entry.started_at.format(TIME_FORMAT))?;
        writeln!(out, "Finished: {}", entry.finished_at.format(TIME_FORMAT))?;
        writeln!(
            out,
            "Duration: {:.2}s",
            seconds_between(entry.started_at, entry.finished_at)
        )?;

        if let Some(error) = &entry.error {
            writeln!(out, "ERROR: {error}")?;
        }

        for (field, value) in &entry.fields {
            write!(out, "  {:<34} {value}", field.label())?;
            if let Some(p) = entry.provenance.iter().find(|p| p.field == *field) {
                if p.previous.is_empty() {
                    write!(out, "  [round {}]", p.round + 1)?;
                } else {
                    write!(out, "  [round {}, was \"{}\"]", p.round + 1, p.previous)?;
                }
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Render and write the transcript to `path`.
pub fn write_transcript(path: &Path, header: &RunHeader, entries: &[TranscriptEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MedContactError::io(parent, e))?;
    }
    let mut text = String::new();
    render_transcript(&mut text, header, entries)
        .map_err(|e| MedContactError::io(path, std::io::Error::other(e)))?;
    std::fs::write(path, text).map_err(|e| MedContactError::io(path, e))?;
    info!(path = %path.display(), records = entries.len(), "wrote transcript");
    Ok(())
}

fn seconds_between(start: DateTime<Local>, end: DateTime<Local>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}
