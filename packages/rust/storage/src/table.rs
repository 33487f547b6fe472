//! CSV table reader and writer.

use std::path::Path;

use medcontact_shared::{Field, MedContactError, Record, Result};
use tracing::{debug, info, warn};

use crate::schema::TableSchema;

/// Whether derived columns are written after the input columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedColumns {
    Include,
    Omit,
}

/// A loaded table: its layout, passthrough column names, and records.
#[derive(Debug, Clone)]
pub struct Table {
    pub schema: TableSchema,
    /// Input columns that map to no field of the schema, in input order.
    pub extra_columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(schema: TableSchema, records: Vec<Record>) -> Self {
        Self {
            schema,
            extra_columns: Vec::new(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Same layout, different rows.
    pub fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            schema: self.schema,
            extra_columns: self.extra_columns.clone(),
            records,
        }
    }
}

/// Where a header lands when reading a row.
enum Slot {
    Field(Field),
    Extra(String),
}

/// Read a CSV table.
///
/// `CRM` is the only required column. Schema columns absent from the file
/// read as empty; columns outside the schema are kept as passthrough values.
/// Every data row becomes a record, blank ones included.
pub fn load_table(path: &Path, schema: TableSchema) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| table_error(path, e))?;

    let headers = reader.headers().map_err(|e| table_error(path, e))?.clone();

    let mut slots = Vec::with_capacity(headers.len());
    let mut extra_columns = Vec::new();
    for header in headers.iter() {
        let slot = match schema.field_for(header) {
            Some(field) if !slots.iter().any(|s| matches!(s, Slot::Field(f) if *f == field)) => {
                Slot::Field(field)
            }
            _ => {
                let name = header.trim_start_matches('\u{feff}').to_string();
                extra_columns.push(name.clone());
                Slot::Extra(name)
            }
        };
        slots.push(slot);
    }

    if !slots.iter().any(|s| matches!(s, Slot::Field(Field::Crm))) {
        return Err(MedContactError::validation(format!(
            "{}: required column CRM not found",
            path.display()
        )));
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| table_error(path, e))?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            debug!(line = index + 2, "blank row kept as empty record");
        }

        let mut record = Record::new();
        for (position, slot) in slots.iter().enumerate() {
            let value = row.get(position).unwrap_or("");
            match slot {
                Slot::Field(field) => record.set(*field, value),
                Slot::Extra(name) => record.push_extra(name.clone(), value),
            }
        }
        if !record.is_filled(Field::Crm) {
            warn!(line = index + 2, "row has no CRM value");
        }
        records.push(record);
    }

    info!(
        path = %path.display(),
        rows = records.len(),
        passthrough = extra_columns.len(),
        "loaded table"
    );

    Ok(Table {
        schema,
        extra_columns,
        records,
    })
}

/// Write `table` as CSV: schema columns, optionally derived columns, then
/// passthrough columns. Creates the parent directory if needed.
pub fn write_table(path: &Path, table: &Table, derived: DerivedColumns) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MedContactError::io(parent, e))?;
    }

    let columns: Vec<(&str, Field)> = match derived {
        DerivedColumns::Include => table.schema.output_columns().collect(),
        DerivedColumns::Omit => table.schema.columns().to_vec(),
    };

    let mut writer = csv::Writer::from_path(path).map_err(|e| table_error(path, e))?;

    let header = columns
        .iter()
        .map(|(name, _)| *name)
        .chain(table.extra_columns.iter().map(String::as_str));
    writer.write_record(header).map_err(|e| table_error(path, e))?;

    for record in &table.records {
        let row = columns
            .iter()
            .map(|(_, field)| record.get(*field))
            .chain(
                table
                    .extra_columns
                    .iter()
                    .enumerate()
                    .map(|(position, name)| passthrough_value(record, position, name)),
            );
        writer.write_record(row).map_err(|e| table_error(path, e))?;
    }

    writer.flush().map_err(|e| MedContactError::io(path, e))?;
    info!(path = %path.display(), rows = table.records.len(), "wrote table");
    Ok(())
}

/// Passthrough cell for the `position`-th extra column. Loaded records carry
/// extras in column order, so duplicated headers keep their own values.
fn passthrough_value<'a>(record: &'a Record, position: usize, name: &str) -> &'a str {
    match record.extras().get(position) {
        Some((column, value)) if column == name => value,
        _ => record.extra(name).unwrap_or(""),
    }
}

fn table_error(path: &Path, err: csv::Error) -> MedContactError {
    MedContactError::Table(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use medcontact_shared::TableSchemaKind;
    use uuid::Uuid;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("mc-table-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn load_maps_columns_and_keeps_extras() {
        let dir = temp_dir();
        let input = dir.join("input.csv");
        std::fs::write(
            &input,
            "CRM,UF,Firstname,Origem,City A1\n12345,SP,Ana,lista-a,\n678,RJ,Bruno,lista-b,Niteroi\n",
        )
        .unwrap();

        let table = load_table(&input, TableSchema::new(TableSchemaKind::Extended)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.extra_columns, vec!["Origem".to_string()]);

        let first = &table.records[0];
        assert_eq!(first.get(Field::Crm), "12345");
        assert_eq!(first.get(Field::FirstName), "Ana");
        assert_eq!(first.get(Field::Email1), "");
        assert_eq!(first.extra("Origem"), Some("lista-a"));
        assert_eq!(table.records[1].get(Field::City), "Niteroi");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_crm_column_is_rejected() {
        let dir = temp_dir();
        let input = dir.join("input.csv");
        std::fs::write(&input, "Nome,UF\nAna,SP\n").unwrap();

        let err = load_table(&input, TableSchema::new(TableSchemaKind::Legacy)).unwrap_err();
        assert!(err.to_string().contains("required column CRM"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn short_rows_and_blank_lines_are_tolerated() {
        let dir = temp_dir();
        let input = dir.join("input.csv");
        std::fs::write(&input, "Nome,CRM,UF,Cidade\nAna,1,SP\n,,,\nBia,2,MG,BH\n").unwrap();

        let table = load_table(&input, TableSchema::new(TableSchemaKind::Legacy)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.records[0].get(Field::City), "");
        assert_eq!(table.records[1].filled_count(), 0);
        assert_eq!(table.records[2].get(Field::City), "BH");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn write_then_load_preserves_rows_and_passthrough() {
        let dir = temp_dir();
        let output = dir.join("nested").join("out.csv");
        let schema = TableSchema::new(TableSchemaKind::Legacy);

        let mut record = Record::new()
            .with(Field::Crm, "12345")
            .with(Field::Uf, "SP")
            .with(Field::City, "São Paulo, SP")
            .with(Field::ProcessingTime, "12.50");
        record.push_extra("Origem", "lista-a");
        let mut table = Table::new(schema, vec![record.clone()]);
        table.extra_columns.push("Origem".into());

        write_table(&output, &table, DerivedColumns::Include).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("Nome,Sobrenome,CRM,UF,"));
        assert!(text.lines().next().unwrap().ends_with("Tempo_Processamento,Erro,Origem"));
        assert!(text.contains("\"São Paulo, SP\""));

        let reloaded = load_table(&output, schema).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.records[0].get(Field::City), "São Paulo, SP");
        assert_eq!(reloaded.records[0].get(Field::ProcessingTime), "12.50");
        assert_eq!(reloaded.records[0].extra("Origem"), Some("lista-a"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn blank_rows_survive_a_round_trip() {
        let dir = temp_dir();
        let input = dir.join("input.csv");
        let output = dir.join("out.csv");
        std::fs::write(&input, "CRM,UF,City A1\n1,SP,\n,,\n2,RJ,\n").unwrap();
        let schema = TableSchema::new(TableSchemaKind::Extended);

        let table = load_table(&input, schema).unwrap();
        write_table(&output, &table, DerivedColumns::Include).unwrap();

        let reloaded = load_table(&output, schema).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.records[1].get(Field::Crm), "");
        assert_eq!(reloaded.records[2].get(Field::Crm), "2");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicated_passthrough_headers_keep_their_own_values() {
        let dir = temp_dir();
        let input = dir.join("input.csv");
        let output = dir.join("out.csv");
        std::fs::write(&input, "CRM,Notes,Notes\n1,first,second\n").unwrap();
        let schema = TableSchema::new(TableSchemaKind::Legacy);

        let table = load_table(&input, schema).unwrap();
        assert_eq!(table.extra_columns, vec!["Notes".to_string(), "Notes".to_string()]);
        write_table(&output, &table, DerivedColumns::Omit).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.ends_with(",first,second"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn omit_derived_writes_input_layout_only() {
        let dir = temp_dir();
        let output = dir.join("out.csv");
        let table = Table::new(
            TableSchema::new(TableSchemaKind::Extended),
            vec![Record::new().with(Field::Crm, "1")],
        );

        write_table(&output, &table, DerivedColumns::Omit).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.ends_with("OPT-IN,STATUS,LOTE"));
        assert!(!header.contains("Processing time"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
