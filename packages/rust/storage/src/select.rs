//! Per-city selection of the most complete rows of an enriched table.

use medcontact_shared::{Field, MedContactError, Record, Result};
use tracing::info;

/// How many rows to take for one city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityQuota {
    pub city: String,
    pub count: usize,
}

impl std::str::FromStr for CityQuota {
    type Err = MedContactError;

    /// Parse `City=N`, e.g. `São Paulo=30`.
    fn from_str(s: &str) -> Result<Self> {
        let (city, count) = s.rsplit_once('=').ok_or_else(|| {
            MedContactError::validation(format!("quota '{s}' must look like City=N"))
        })?;
        let city = city.trim();
        if city.is_empty() {
            return Err(MedContactError::validation(format!("quota '{s}' has no city")));
        }
        let count = count.trim().parse::<usize>().map_err(|e| {
            MedContactError::validation(format!("quota '{s}' has an invalid count: {e}"))
        })?;
        Ok(Self {
            city: city.to_string(),
            count,
        })
    }
}

/// Rows picked for each quota, in quota order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub records: Vec<Record>,
    /// `(city, rows taken)` per quota.
    pub counts: Vec<(String, usize)>,
}

/// For every quota, take up to `count` rows whose city matches, preferring
/// rows with more non-empty cells. Ties keep input order.
pub fn select_complete(records: &[Record], quotas: &[CityQuota]) -> Selection {
    let mut selection = Selection::default();

    for quota in quotas {
        let mut candidates: Vec<&Record> = records
            .iter()
            .filter(|r| r.get(Field::City).trim() == quota.city)
            .collect();
        candidates.sort_by_key(|r| std::cmp::Reverse(r.filled_count()));

        let taken = candidates.len().min(quota.count);
        selection
            .records
            .extend(candidates.into_iter().take(taken).cloned());
        selection.counts.push((quota.city.clone(), taken));

        info!(city = %quota.city, requested = quota.count, taken, "selected rows");
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(crm: &str, city: &str, filled: usize) -> Record {
        let mut record = Record::new().with(Field::Crm, crm).with(Field::City, city);
        let extra = [Field::Phone1, Field::Email1, Field::Street, Field::Number];
        for field in extra.iter().take(filled) {
            record.set(*field, "x");
        }
        record
    }

    #[test]
    fn quota_parsing() {
        let quota: CityQuota = "São Paulo=30".parse().unwrap();
        assert_eq!(quota.city, "São Paulo");
        assert_eq!(quota.count, 30);
        assert!("Recife".parse::<CityQuota>().is_err());
        assert!("=3".parse::<CityQuota>().is_err());
        assert!("Recife=many".parse::<CityQuota>().is_err());
    }

    #[test]
    fn picks_most_complete_rows_per_city_in_quota_order() {
        let records = vec![
            row("1", "Curitiba", 1),
            row("2", "Recife", 0),
            row("3", "Curitiba", 3),
            row("4", "Recife", 2),
            row("5", "Curitiba", 3),
            row("6", "Natal", 4),
        ];
        let quotas = vec![
            CityQuota { city: "Recife".into(), count: 5 },
            CityQuota { city: "Curitiba".into(), count: 2 },
            CityQuota { city: "Manaus".into(), count: 1 },
        ];

        let selection = select_complete(&records, &quotas);
        let crms: Vec<&str> = selection.records.iter().map(|r| r.get(Field::Crm)).collect();
        assert_eq!(crms, vec!["4", "2", "3", "5"]);
        assert_eq!(
            selection.counts,
            vec![
                ("Recife".to_string(), 2),
                ("Curitiba".to_string(), 2),
                ("Manaus".to_string(), 0),
            ]
        );
    }
}
