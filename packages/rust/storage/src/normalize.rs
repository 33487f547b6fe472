//! Conversion of arbitrary physician lists into the extended input layout.
//!
//! Only identity and name columns survive; every enrichment column starts
//! empty so the engine treats the whole row as unknown.

use std::path::Path;

use medcontact_shared::{Field, MedContactError, Record, Result, TableSchemaKind};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::schema::TableSchema;
use crate::table::{DerivedColumns, Table, write_table};

/// Fields copied from the source list.
const KEPT_FIELDS: [Field; 6] = [
    Field::Hash,
    Field::Crm,
    Field::Uf,
    Field::FirstName,
    Field::LastName,
    Field::Specialty,
];

/// Read `input` with any column naming and write it to `output` in the
/// extended layout. Returns the number of rows written.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn normalize_table(input: &Path, output: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(input)
        .map_err(|e| MedContactError::Table(format!("{}: {e}", input.display())))?;
    let headers = reader
        .headers()
        .map_err(|e| MedContactError::Table(format!("{}: {e}", input.display())))?
        .clone();

    let positions: Vec<(Field, usize)> = KEPT_FIELDS
        .iter()
        .filter_map(|field| {
            headers
                .iter()
                .position(|h| Field::from_alias(h.trim_start_matches('\u{feff}')) == Some(*field))
                .map(|pos| (*field, pos))
        })
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| MedContactError::Table(format!("{}: {e}", input.display())))?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut record = Record::new();
        for (field, pos) in &positions {
            let value = row.get(*pos).unwrap_or("").trim();
            let value = if *field == Field::Crm {
                integer_license(value)
            } else {
                value.to_string()
            };
            record.set(*field, value);
        }
        if !record.is_filled(Field::Hash) {
            let hash = row_hash(record.get(Field::Crm), record.get(Field::Uf));
            record.set(Field::Hash, hash);
        }
        records.push(record);
    }

    let table = Table::new(TableSchema::new(TableSchemaKind::Extended), records);
    write_table(output, &table, DerivedColumns::Omit)?;

    info!(rows = table.len(), "normalized table");
    Ok(table.len())
}

/// Spreadsheet exports often turn `12345` into `12345.0`; undo that.
pub fn integer_license(raw: &str) -> String {
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        _ => raw.to_string(),
    }
}

/// Stable row key: first 16 hex characters of SHA-256 over `CRM:UF`.
pub fn row_hash(crm: &str, uf: &str) -> String {
    let digest = Sha256::digest(format!("{crm}:{uf}").as_bytes());
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
