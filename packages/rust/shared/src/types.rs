//! Core domain types for physician contact records.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// How a field participates in enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldClass {
    /// License number, jurisdiction, row hash. Never altered after load.
    Identity,
    /// Carried through unchanged (names, opt-in, batch markers).
    Reference,
    /// Target of the merge policy.
    Enrichment,
    /// Written once when a record finishes processing.
    Derived,
}

/// Canonical field of a physician record.
///
/// Declaration order is significant: it is the order fields appear in
/// prompts, transcripts, and anywhere a record is rendered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Hash,
    Crm,
    Uf,
    CrmStatus,
    FirstName,
    LastName,
    Specialty,
    FullAddress,
    Street,
    Number,
    Complement,
    Neighborhood,
    PostalCode,
    City,
    State,
    Phone1,
    Phone2,
    Mobile1,
    Mobile2,
    Email1,
    Email2,
    OptIn,
    Status,
    Lot,
    Email1Likelihood,
    Email2Likelihood,
    ProcessingTime,
    Error,
}

impl Field {
    /// Every field, in declaration order.
    pub const ALL: [Field; 28] = [
        Self::Hash,
        Self::Crm,
        Self::Uf,
        Self::CrmStatus,
        Self::FirstName,
        Self::LastName,
        Self::Specialty,
        Self::FullAddress,
        Self::Street,
        Self::Number,
        Self::Complement,
        Self::Neighborhood,
        Self::PostalCode,
        Self::City,
        Self::State,
        Self::Phone1,
        Self::Phone2,
        Self::Mobile1,
        Self::Mobile2,
        Self::Email1,
        Self::Email2,
        Self::OptIn,
        Self::Status,
        Self::Lot,
        Self::Email1Likelihood,
        Self::Email2Likelihood,
        Self::ProcessingTime,
        Self::Error,
    ];

    /// Canonical key, used as the JSON key requested from the provider.
    pub fn key(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Crm => "crm",
            Self::Uf => "uf",
            Self::CrmStatus => "crm_status",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Specialty => "specialty",
            Self::FullAddress => "full_address",
            Self::Street => "street",
            Self::Number => "number",
            Self::Complement => "complement",
            Self::Neighborhood => "neighborhood",
            Self::PostalCode => "postal_code",
            Self::City => "city",
            Self::State => "state",
            Self::Phone1 => "phone1",
            Self::Phone2 => "phone2",
            Self::Mobile1 => "mobile1",
            Self::Mobile2 => "mobile2",
            Self::Email1 => "email1",
            Self::Email2 => "email2",
            Self::OptIn => "opt_in",
            Self::Status => "status",
            Self::Lot => "lot",
            Self::Email1Likelihood => "email1_likelihood",
            Self::Email2Likelihood => "email2_likelihood",
            Self::ProcessingTime => "processing_time",
            Self::Error => "error",
        }
    }

    /// Human-readable label for prompts and transcripts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Hash => "Row hash",
            Self::Crm => "CRM (medical license number)",
            Self::Uf => "UF (license state)",
            Self::CrmStatus => "CRM status",
            Self::FirstName => "First name",
            Self::LastName => "Last name",
            Self::Specialty => "Medical specialty",
            Self::FullAddress => "Full address",
            Self::Street => "Street",
            Self::Number => "Street number",
            Self::Complement => "Complement (suite, floor, block)",
            Self::Neighborhood => "Neighborhood",
            Self::PostalCode => "Postal code (CEP)",
            Self::City => "City",
            Self::State => "State (UF)",
            Self::Phone1 => "Landline phone 1",
            Self::Phone2 => "Landline phone 2",
            Self::Mobile1 => "Mobile phone 1",
            Self::Mobile2 => "Mobile phone 2",
            Self::Email1 => "E-mail 1",
            Self::Email2 => "E-mail 2",
            Self::OptIn => "Opt-in",
            Self::Status => "Status",
            Self::Lot => "Lot",
            Self::Email1Likelihood => "E-mail 1 likelihood",
            Self::Email2Likelihood => "E-mail 2 likelihood",
            Self::ProcessingTime => "Processing time",
            Self::Error => "Error",
        }
    }

    /// Role of this field during enrichment.
    pub fn class(self) -> FieldClass {
        match self {
            Self::Hash | Self::Crm | Self::Uf => FieldClass::Identity,
            Self::CrmStatus
            | Self::FirstName
            | Self::LastName
            | Self::OptIn
            | Self::Status
            | Self::Lot => FieldClass::Reference,
            Self::Email1Likelihood
            | Self::Email2Likelihood
            | Self::ProcessingTime
            | Self::Error => FieldClass::Derived,
            _ => FieldClass::Enrichment,
        }
    }

    /// Whether the merge policy may write this field.
    pub fn is_enrichable(self) -> bool {
        self.class() == FieldClass::Enrichment
    }

    /// Resolve any known spelling (prompt key, Portuguese or English column
    /// name) to its canonical field.
    pub fn from_alias(raw: &str) -> Option<Field> {
        let normalized = normalize_alias(raw);
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, field)| *field)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Lowercase, trim, and fold separators so `"E-mail A1"`, `"e_mail_a1"` and
/// `"E MAIL A1"` compare equal.
fn normalize_alias(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        let c = if matches!(c, ' ' | '-' | '.' | '/') { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// Every accepted spelling, already normalized.
static ALIASES: &[(&str, Field)] = &[
    ("hash", Field::Hash),
    ("crm", Field::Crm),
    ("uf", Field::Uf),
    ("crm_status", Field::CrmStatus),
    ("status_crm", Field::CrmStatus),
    ("first_name", Field::FirstName),
    ("firstname", Field::FirstName),
    ("primeiro_nome", Field::FirstName),
    ("nome", Field::FirstName),
    ("last_name", Field::LastName),
    ("lastname", Field::LastName),
    ("sobrenome", Field::LastName),
    ("specialty", Field::Specialty),
    ("medical_specialty", Field::Specialty),
    ("especialidade", Field::Specialty),
    ("especialidade_medica", Field::Specialty),
    ("especialidade_médica", Field::Specialty),
    ("full_address", Field::FullAddress),
    ("address", Field::FullAddress),
    ("endereco", Field::FullAddress),
    ("endereco_completo", Field::FullAddress),
    ("endereco_completo_a1", Field::FullAddress),
    ("street", Field::Street),
    ("address_a1", Field::Street),
    ("logradouro", Field::Street),
    ("logradouro_a1", Field::Street),
    ("number", Field::Number),
    ("numero", Field::Number),
    ("numero_a1", Field::Number),
    ("complement", Field::Complement),
    ("complement_a1", Field::Complement),
    ("complemento", Field::Complement),
    ("complemento_a1", Field::Complement),
    ("neighborhood", Field::Neighborhood),
    ("bairro", Field::Neighborhood),
    ("bairro_a1", Field::Neighborhood),
    ("postal_code", Field::PostalCode),
    ("postal_code_a1", Field::PostalCode),
    ("cep", Field::PostalCode),
    ("cep_a1", Field::PostalCode),
    ("city", Field::City),
    ("city_a1", Field::City),
    ("cidade", Field::City),
    ("cidade_a1", Field::City),
    ("state", Field::State),
    ("state_a1", Field::State),
    ("estado", Field::State),
    ("estado_a1", Field::State),
    ("phone1", Field::Phone1),
    ("phone_a1", Field::Phone1),
    ("telefone1", Field::Phone1),
    ("telefone_a1", Field::Phone1),
    ("phone2", Field::Phone2),
    ("phone_a2", Field::Phone2),
    ("telefone2", Field::Phone2),
    ("telefone_a2", Field::Phone2),
    ("mobile1", Field::Mobile1),
    ("cell_phone_a1", Field::Mobile1),
    ("celular1", Field::Mobile1),
    ("celular_a1", Field::Mobile1),
    ("mobile2", Field::Mobile2),
    ("cell_phone_a2", Field::Mobile2),
    ("celular2", Field::Mobile2),
    ("celular_a2", Field::Mobile2),
    ("email1", Field::Email1),
    ("email_a1", Field::Email1),
    ("e_mail_a1", Field::Email1),
    ("email2", Field::Email2),
    ("email_a2", Field::Email2),
    ("e_mail_a2", Field::Email2),
    ("opt_in", Field::OptIn),
    ("status", Field::Status),
    ("lot", Field::Lot),
    ("lote", Field::Lot),
    ("email1_likelihood", Field::Email1Likelihood),
    ("chance_email_a1", Field::Email1Likelihood),
    ("chance_email1", Field::Email1Likelihood),
    ("email2_likelihood", Field::Email2Likelihood),
    ("chance_email_a2", Field::Email2Likelihood),
    ("chance_email2", Field::Email2Likelihood),
    ("processing_time", Field::ProcessingTime),
    ("tempo_processamento", Field::ProcessingTime),
    ("tempo_total_processamento", Field::ProcessingTime),
    ("error", Field::Error),
    ("erro", Field::Error),
];

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One physician row: canonical field values plus passthrough columns.
///
/// A missing field reads as the empty string, which means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<Field, String>,
    /// Input columns that map to no known field, in input order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    extras: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `field`, or `""` when unknown.
    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or("")
    }

    /// Set `field`. Empty values are stored so the column still round-trips.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Whether `field` holds a non-blank value.
    pub fn is_filled(&self, field: Field) -> bool {
        !self.get(field).trim().is_empty()
    }

    /// Non-blank fields in declaration order.
    pub fn filled(&self) -> impl Iterator<Item = (Field, &str)> {
        self.values
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(f, v)| (*f, v.as_str()))
    }

    /// Passthrough columns.
    pub fn extras(&self) -> &[(String, String)] {
        &self.extras
    }

    /// Value of a passthrough column, if present.
    pub fn extra(&self, column: &str) -> Option<&str> {
        self.extras
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn push_extra(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.extras.push((column.into(), value.into()));
    }

    /// Count of non-blank cells, known fields and passthrough columns alike.
    pub fn filled_count(&self) -> usize {
        self.filled().count()
            + self
                .extras
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .count()
    }

    /// Short identity label for logs, e.g. `CRM 12345/SP`.
    pub fn label(&self) -> String {
        match (self.get(Field::Crm), self.get(Field::Uf)) {
            ("", _) => "CRM ?".to_string(),
            (crm, "") => format!("CRM {crm}"),
            (crm, uf) => format!("CRM {crm}/{uf}"),
        }
    }
}

/// Which round supplied a field's final value, and what it replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub field: Field,
    /// Zero-based round ordinal.
    pub round: usize,
    /// Value held before the run touched the field (may be empty).
    pub previous: String,
}

// ---------------------------------------------------------------------------
// EmailLikelihood
// ---------------------------------------------------------------------------

/// Provider's rating of how likely a discovered e-mail belongs to the physician.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmailLikelihood {
    HighlyLikely,
    Likely,
    Unlikely,
}

impl EmailLikelihood {
    /// Label written to the output table.
    pub fn label(self) -> &'static str {
        match self {
            Self::HighlyLikely => "MUITO PROVAVEL",
            Self::Likely => "PROVAVEL",
            Self::Unlikely => "NADA PROVAVEL",
        }
    }

    /// Parse a rating in either the table labels or English spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| match c {
                'Á' | 'À' | 'Â' | 'Ã' => 'A',
                '-' | '_' => ' ',
                other => other,
            })
            .collect();
        let folded = folded.split_whitespace().collect::<Vec<_>>().join(" ");

        match folded.as_str() {
            "MUITO PROVAVEL" | "HIGHLY LIKELY" | "VERY LIKELY" => Some(Self::HighlyLikely),
            "PROVAVEL" | "LIKELY" => Some(Self::Likely),
            "NADA PROVAVEL" | "POUCO PROVAVEL" | "IMPROVAVEL" | "UNLIKELY" | "NOT LIKELY" => {
                Some(Self::Unlikely)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for EmailLikelihood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// An opaque provider access token. Cheap to clone; never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    slot: usize,
    secret: Arc<str>,
}

impl Credential {
    pub fn new(slot: usize, secret: impl Into<Arc<str>>) -> Self {
        Self {
            slot,
            secret: secret.into(),
        }
    }

    /// Position of this credential in the loaded pool.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The raw secret, for building the provider channel only.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Last four characters, for log correlation.
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("…{tail}")
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(slot={}, {})", self.slot, self.hint())
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key #{} ({})", self.slot + 1, self.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_table_resolves_column_and_prompt_spellings() {
        assert_eq!(Field::from_alias("E-mail A1"), Some(Field::Email1));
        assert_eq!(Field::from_alias("email_a1"), Some(Field::Email1));
        assert_eq!(Field::from_alias("Cell phone A2"), Some(Field::Mobile2));
        assert_eq!(Field::from_alias("celular1"), Some(Field::Mobile1));
        assert_eq!(Field::from_alias("Endereco Completo A1"), Some(Field::FullAddress));
        assert_eq!(Field::from_alias("Address A1"), Some(Field::Street));
        assert_eq!(Field::from_alias("postal code A1"), Some(Field::PostalCode));
        assert_eq!(Field::from_alias("Especialidade Médica"), Some(Field::Specialty));
        assert_eq!(Field::from_alias("chance_email_a2"), Some(Field::Email2Likelihood));
        assert_eq!(Field::from_alias("OPT-IN"), Some(Field::OptIn));
        assert_eq!(Field::from_alias("LOTE"), Some(Field::Lot));
        assert_eq!(Field::from_alias("favorite_color"), None);
    }

    #[test]
    fn every_canonical_key_is_an_alias_of_itself() {
        for field in Field::ALL {
            assert_eq!(Field::from_alias(field.key()), Some(field), "{field}");
        }
    }

    #[test]
    fn field_classes() {
        assert_eq!(Field::Crm.class(), FieldClass::Identity);
        assert_eq!(Field::FirstName.class(), FieldClass::Reference);
        assert!(Field::City.is_enrichable());
        assert!(!Field::Email1Likelihood.is_enrichable());
        assert_eq!(
            Field::ALL.iter().filter(|f| f.is_enrichable()).count(),
            15
        );
    }

    #[test]
    fn record_defaults_to_empty() {
        let record = Record::new().with(Field::Crm, "12345").with(Field::Uf, "SP");
        assert_eq!(record.get(Field::City), "");
        assert!(!record.is_filled(Field::City));
        assert_eq!(record.label(), "CRM 12345/SP");
        assert_eq!(record.filled_count(), 2);
    }

    #[test]
    fn record_extras_preserve_order() {
        let mut record = Record::new();
        record.push_extra("Origem", "lista-a");
        record.push_extra("Obs", "");
        assert_eq!(record.extra("Origem"), Some("lista-a"));
        assert_eq!(record.extras().len(), 2);
        assert_eq!(record.filled_count(), 1);
    }

    #[test]
    fn likelihood_parses_both_vocabularies() {
        assert_eq!(EmailLikelihood::parse("MUITO PROVÁVEL"), Some(EmailLikelihood::HighlyLikely));
        assert_eq!(EmailLikelihood::parse("highly-likely"), Some(EmailLikelihood::HighlyLikely));
        assert_eq!(EmailLikelihood::parse(" provavel "), Some(EmailLikelihood::Likely));
        assert_eq!(EmailLikelihood::parse("unlikely"), Some(EmailLikelihood::Unlikely));
        assert_eq!(EmailLikelihood::parse("NADA PROVAVEL"), Some(EmailLikelihood::Unlikely));
        assert_eq!(EmailLikelihood::parse("MUITO PROVAVEL|PROVAVEL"), None);
        assert_eq!(EmailLikelihood::Likely.to_string(), "PROVAVEL");
    }

    #[test]
    fn credential_never_prints_secret() {
        let cred = Credential::new(1, "AIzaSyExampleSecretKey1234");
        let shown = format!("{cred:?} {cred}");
        assert!(!shown.contains("ExampleSecret"));
        assert!(shown.contains("1234"));
        assert_eq!(cred.expose(), "AIzaSyExampleSecretKey1234");
    }
}
