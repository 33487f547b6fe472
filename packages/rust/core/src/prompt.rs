//! Prompt rendering.
//!
//! A template is markdown with `{{placeholder}}` slots. Rendering is pure:
//! the same record state and round always produce the same text.

use medcontact_shared::{Field, Record};

use crate::rounds::RoundDescriptor;

/// Fields that identify the physician to the search engine.
const IDENTITY_FIELDS: [Field; 5] = [
    Field::FirstName,
    Field::LastName,
    Field::Crm,
    Field::Uf,
    Field::CrmStatus,
];

/// Render the request for `round`.
///
/// `original` is the record as loaded; `current` is the state after earlier
/// rounds. Values present in `original` are listed as existing, values that
/// differ from it as discovered.
pub fn build_prompt(round: &RoundDescriptor, original: &Record, current: &Record) -> String {
    let slots = [
        ("{{identity}}", identity_block(current)),
        ("{{existing}}", existing_block(original)),
        ("{{discovered}}", discovered_block(original, current)),
        ("{{missing}}", missing_block(round, current)),
        ("{{emails}}", emails_block(current)),
        ("{{schema}}", schema_block(round)),
    ];

    slots
        .iter()
        .fold(round.template.to_string(), |text, (slot, value)| {
            text.replace(slot, value)
        })
}

fn bullet(field: Field, value: &str) -> String {
    format!("- {}: {}", field.label(), value.trim())
}

fn or_placeholder(lines: Vec<String>, placeholder: &str) -> String {
    if lines.is_empty() {
        placeholder.to_string()
    } else {
        lines.join("\n")
    }
}

fn identity_block(current: &Record) -> String {
    let lines = IDENTITY_FIELDS
        .iter()
        .filter(|f| current.is_filled(**f))
        .map(|f| bullet(*f, current.get(*f)))
        .collect();
    or_placeholder(lines, "- (no identifying data)")
}

fn existing_block(original: &Record) -> String {
    let lines = Field::ALL
        .iter()
        .filter(|f| f.is_enrichable() && original.is_filled(**f))
        .map(|f| bullet(*f, original.get(*f)))
        .collect();
    or_placeholder(lines, "- (none)")
}

fn discovered_block(original: &Record, current: &Record) -> String {
    let lines = Field::ALL
        .iter()
        .filter(|f| {
            f.is_enrichable()
                && current.is_filled(**f)
                && current.get(**f).trim() != original.get(**f).trim()
        })
        .map(|f| bullet(*f, current.get(*f)))
        .collect();
    or_placeholder(lines, "- (nothing discovered yet)")
}

fn missing_block(round: &RoundDescriptor, current: &Record) -> String {
    let lines = round
        .enrichable_fields()
        .filter(|f| !current.is_filled(*f))
        .map(|f| format!("- {} (`{}`)", f.label(), f.key()))
        .collect();
    or_placeholder(
        lines,
        "- (nothing missing: confirm and improve the values above)",
    )
}

fn emails_block(current: &Record) -> String {
    [Field::Email1, Field::Email2]
        .iter()
        .map(|f| {
            let value = current.get(*f).trim();
            let shown = if value.is_empty() { "(empty)" } else { value };
            format!("- {} (`{}`): {shown}", f.label(), f.key())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn schema_block(round: &RoundDescriptor) -> String {
    let keys = round
        .requested_fields
        .iter()
        .map(|f| format!("  \"{}\": \"\"", f.key()))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("```json\n{{\n{keys}\n}}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rounds::{RoundKind, round_table};
    use medcontact_shared::ProfileKind;

    fn record() -> Record {
        Record::new()
            .with(Field::FirstName, "Ana")
            .with(Field::LastName, "Souza")
            .with(Field::Crm, "12345")
            .with(Field::Uf, "SP")
            .with(Field::City, "SP")
    }

    #[test]
    fn profile_prompt_separates_existing_and_discovered() {
        let rounds = round_table(ProfileKind::Extended);
        let original = record();
        let current = original
            .clone()
            .with(Field::City, "São Paulo")
            .with(Field::Phone1, "+55 (11) 3333-4444");

        let prompt = build_prompt(&rounds[1], &original, &current);
        assert!(prompt.contains("- First name: Ana"));
        assert!(prompt.contains("- CRM (medical license number): 12345"));

        let existing = prompt.split("## Values from the input list").nth(1).unwrap();
        let existing = existing.split("##").next().unwrap();
        assert!(existing.contains("- City: SP"));

        let discovered = prompt.split("## Values discovered").nth(1).unwrap();
        let discovered = discovered.split("##").next().unwrap();
        assert!(discovered.contains("- City: São Paulo"));
        assert!(discovered.contains("- Landline phone 1: +55 (11) 3333-4444"));

        assert!(prompt.contains("- E-mail 1 (`email1`)"));
        assert!(!prompt.contains("- City (`city`)"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn schema_lists_round_keys_in_order() {
        let rounds = round_table(ProfileKind::Extended);
        let phones = &rounds[6];
        assert_eq!(phones.kind, RoundKind::Phones);

        let prompt = build_prompt(phones, &record(), &record());
        assert!(prompt.contains(
            "```json\n{\n  \"phone1\": \"\",\n  \"phone2\": \"\",\n  \"mobile1\": \"\",\n  \"mobile2\": \"\"\n}\n```"
        ));
    }

    #[test]
    fn plausibility_prompt_lists_emails_and_rating_keys() {
        let rounds = round_table(ProfileKind::Extended);
        let current = record().with(Field::Email1, "ana.souza@clinica.com.br");

        let prompt = build_prompt(&rounds[8], &record(), &current);
        assert!(prompt.contains("- E-mail 1 (`email1`): ana.souza@clinica.com.br"));
        assert!(prompt.contains("- E-mail 2 (`email2`): (empty)"));
        assert!(prompt.contains("\"email1_likelihood\": \"\""));
    }

    #[test]
    fn rendering_is_deterministic() {
        let rounds = round_table(ProfileKind::Standard);
        let a = build_prompt(&rounds[3], &record(), &record());
        let b = build_prompt(&rounds[3], &record(), &record());
        assert_eq!(a, b);
        assert!(a.contains("- (nothing discovered yet)"));
    }
}
