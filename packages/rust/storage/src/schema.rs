//! Column layouts of the physician table.

use medcontact_shared::{Field, TableSchemaKind};

/// Portuguese column set used by the first generation of input files.
const LEGACY_COLUMNS: &[(&str, Field)] = &[
    ("Nome", Field::FirstName),
    ("Sobrenome", Field::LastName),
    ("CRM", Field::Crm),
    ("UF", Field::Uf),
    ("STATUS_CRM", Field::CrmStatus),
    ("Especialidade Médica", Field::Specialty),
    ("Endereco Completo", Field::FullAddress),
    ("Logradouro", Field::Street),
    ("Numero", Field::Number),
    ("Complemento", Field::Complement),
    ("Bairro", Field::Neighborhood),
    ("CEP", Field::PostalCode),
    ("Cidade", Field::City),
    ("Estado", Field::State),
    ("Telefone A1", Field::Phone1),
    ("Telefone A2", Field::Phone2),
    ("Celular A1", Field::Mobile1),
    ("Celular A2", Field::Mobile2),
    ("E-mail A1", Field::Email1),
    ("E-mail A2", Field::Email2),
];

const LEGACY_DERIVED: &[(&str, Field)] = &[
    ("Tempo_Processamento", Field::ProcessingTime),
    ("Erro", Field::Error),
];

/// Hash-keyed English column set with opt-in and lot markers.
const EXTENDED_COLUMNS: &[(&str, Field)] = &[
    ("Hash", Field::Hash),
    ("CRM", Field::Crm),
    ("UF", Field::Uf),
    ("Firstname", Field::FirstName),
    ("LastName", Field::LastName),
    ("Medical specialty", Field::Specialty),
    ("Endereco Completo A1", Field::FullAddress),
    ("Address A1", Field::Street),
    ("Numero A1", Field::Number),
    ("Complement A1", Field::Complement),
    ("Bairro A1", Field::Neighborhood),
    ("postal code A1", Field::PostalCode),
    ("City A1", Field::City),
    ("State A1", Field::State),
    ("Phone A1", Field::Phone1),
    ("Phone A2", Field::Phone2),
    ("Cell phone A1", Field::Mobile1),
    ("Cell phone A2", Field::Mobile2),
    ("E-mail A1", Field::Email1),
    ("E-mail A2", Field::Email2),
    ("OPT-IN", Field::OptIn),
    ("STATUS", Field::Status),
    ("LOTE", Field::Lot),
];

const EXTENDED_DERIVED: &[(&str, Field)] = &[
    ("chance_email_a1", Field::Email1Likelihood),
    ("chance_email_a2", Field::Email2Likelihood),
    ("Processing time", Field::ProcessingTime),
    ("Error", Field::Error),
];

/// Mapping between table column names and canonical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    kind: TableSchemaKind,
    columns: &'static [(&'static str, Field)],
    derived: &'static [(&'static str, Field)],
}

impl TableSchema {
    pub fn new(kind: TableSchemaKind) -> Self {
        match kind {
            TableSchemaKind::Legacy => Self {
                kind,
                columns: LEGACY_COLUMNS,
                derived: LEGACY_DERIVED,
            },
            TableSchemaKind::Extended => Self {
                kind,
                columns: EXTENDED_COLUMNS,
                derived: EXTENDED_DERIVED,
            },
        }
    }

    pub fn kind(&self) -> TableSchemaKind {
        self.kind
    }

    /// Input columns, in file order.
    pub fn columns(&self) -> &'static [(&'static str, Field)] {
        self.columns
    }

    /// Columns appended to the output once records are processed.
    pub fn derived(&self) -> &'static [(&'static str, Field)] {
        self.derived
    }

    /// Input columns followed by derived columns.
    pub fn output_columns(&self) -> impl Iterator<Item = (&'static str, Field)> + '_ {
        self.columns.iter().chain(self.derived.iter()).copied()
    }

    /// Column name this schema uses for `field`.
    pub fn column_for(&self, field: Field) -> Option<&'static str> {
        self.output_columns()
            .find(|(_, f)| *f == field)
            .map(|(name, _)| name)
    }

    /// Resolve a header to a field carried by this schema.
    ///
    /// Exact column names win; otherwise any alias of a field the schema
    /// carries is accepted. Fields outside the schema resolve to `None` so
    /// their columns pass through untouched.
    pub fn field_for(&self, header: &str) -> Option<Field> {
        let header = header.trim().trim_start_matches('\u{feff}');
        if let Some((_, field)) = self
            .output_columns()
            .find(|(name, _)| name.eq_ignore_ascii_case(header))
        {
            return Some(field);
        }
        Field::from_alias(header).filter(|field| self.column_for(*field).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_layout() {
        let schema = TableSchema::new(TableSchemaKind::Extended);
        assert_eq!(schema.columns().len(), 23);
        assert_eq!(schema.columns()[0], ("Hash", Field::Hash));
        assert_eq!(schema.output_columns().count(), 27);
        assert_eq!(schema.column_for(Field::Email1Likelihood), Some("chance_email_a1"));
        assert_eq!(schema.field_for("city a1"), Some(Field::City));
        assert_eq!(schema.field_for("Cidade"), Some(Field::City));
    }

    #[test]
    fn legacy_layout_has_no_hash_or_likelihood() {
        let schema = TableSchema::new(TableSchemaKind::Legacy);
        assert_eq!(schema.columns().len(), 20);
        assert_eq!(schema.column_for(Field::Hash), None);
        assert_eq!(schema.column_for(Field::Email2Likelihood), None);
        assert_eq!(schema.field_for("Hash"), None);
        assert_eq!(schema.field_for("Tempo_Processamento"), Some(Field::ProcessingTime));
        assert_eq!(schema.field_for("\u{feff}Nome"), Some(Field::FirstName));
    }

    #[test]
    fn every_schema_column_maps_to_a_distinct_field() {
        for kind in [TableSchemaKind::Legacy, TableSchemaKind::Extended] {
            let schema = TableSchema::new(kind);
            let mut fields: Vec<Field> = schema.output_columns().map(|(_, f)| f).collect();
            let total = fields.len();
            fields.sort();
            fields.dedup();
            assert_eq!(fields.len(), total, "{kind:?}");
        }
    }
}
