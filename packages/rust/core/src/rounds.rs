//! Round descriptors and the built-in round tables.

use medcontact_shared::{Field, ProfileKind};

const PROFILE_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/profile.md"));
const PHONES_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/phones.md"));
const EMAILS_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/emails.md"));
const EMAIL_PLAUSIBILITY_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/email_plausibility.md"
));

/// Number of general profile rounds in every table.
const PROFILE_ROUNDS: usize = 6;

const PROFILE_FIELDS: &[Field] = &[
    Field::Specialty,
    Field::FullAddress,
    Field::Street,
    Field::Number,
    Field::Complement,
    Field::Neighborhood,
    Field::PostalCode,
    Field::City,
    Field::State,
    Field::Phone1,
    Field::Phone2,
    Field::Mobile1,
    Field::Mobile2,
    Field::Email1,
    Field::Email2,
];

const PHONE_FIELDS: &[Field] = &[Field::Phone1, Field::Phone2, Field::Mobile1, Field::Mobile2];

const EMAIL_FIELDS: &[Field] = &[Field::Email1, Field::Email2];

const PLAUSIBILITY_FIELDS: &[Field] = &[
    Field::Email1,
    Field::Email1Likelihood,
    Field::Email2,
    Field::Email2Likelihood,
];

/// What a round asks the provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundKind {
    /// Address, phones, e-mails and specialty in one pass.
    Profile,
    /// Exhaustive phone search.
    Phones,
    /// Exhaustive e-mail search.
    Emails,
    /// Rate each discovered e-mail on the three-level scale.
    EmailPlausibility,
}

/// One entry of a round table. The engine iterates these generically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundDescriptor {
    pub id: String,
    pub kind: RoundKind,
    /// Keys of the JSON object the provider must return, in order.
    pub requested_fields: &'static [Field],
    pub template: &'static str,
    /// The round should leave at least one requested field non-empty.
    pub mandatory: bool,
    /// Use the extended pre-request delay instead of the linear one.
    pub extended_delay: bool,
}

impl RoundDescriptor {
    fn profile(ordinal: usize, extended_delay: bool) -> Self {
        Self {
            id: format!("profile-{}", ordinal + 1),
            kind: RoundKind::Profile,
            requested_fields: PROFILE_FIELDS,
            template: PROFILE_TEMPLATE,
            mandatory: false,
            extended_delay,
        }
    }

    fn phones() -> Self {
        Self {
            id: "phones".into(),
            kind: RoundKind::Phones,
            requested_fields: PHONE_FIELDS,
            template: PHONES_TEMPLATE,
            mandatory: true,
            extended_delay: true,
        }
    }

    fn emails() -> Self {
        Self {
            id: "emails".into(),
            kind: RoundKind::Emails,
            requested_fields: EMAIL_FIELDS,
            template: EMAILS_TEMPLATE,
            mandatory: true,
            extended_delay: true,
        }
    }

    fn email_plausibility() -> Self {
        Self {
            id: "email-plausibility".into(),
            kind: RoundKind::EmailPlausibility,
            requested_fields: PLAUSIBILITY_FIELDS,
            template: EMAIL_PLAUSIBILITY_TEMPLATE,
            mandatory: false,
            extended_delay: true,
        }
    }

    /// Requested fields the merge policy may write.
    pub fn enrichable_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.requested_fields
            .iter()
            .copied()
            .filter(|f| f.is_enrichable())
    }
}

/// Round table for a profile.
pub fn round_table(profile: ProfileKind) -> Vec<RoundDescriptor> {
    match profile {
        ProfileKind::Standard => (0..PROFILE_ROUNDS)
            .map(|i| RoundDescriptor::profile(i, i + 1 == PROFILE_ROUNDS))
            .collect(),
        ProfileKind::Extended => {
            let mut rounds: Vec<_> = (0..PROFILE_ROUNDS)
                .map(|i| RoundDescriptor::profile(i, false))
                .collect();
            rounds.push(RoundDescriptor::phones());
            rounds.push(RoundDescriptor::emails());
            rounds.push(RoundDescriptor::email_plausibility());
            rounds
        }
    }
}
