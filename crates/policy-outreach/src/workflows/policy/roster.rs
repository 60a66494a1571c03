use std::collections::HashSet;
use std::io::Read;

use serde::Deserialize;

use super::allocation::Caseworker;
use super::domain::CaseworkerId;

#[derive(Debug, thiserror::Error)]
pub enum RosterImportError {
    #[error("failed to read caseworker roster: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: conversion_rate {value} must be between 0 and 1")]
    InvalidConversionRate { row: usize, value: f64 },
    #[error("row {row}: caseworker id is empty")]
    MissingId { row: usize },
    #[error("caseworker {0} appears more than once")]
    DuplicateId(CaseworkerId),
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    id: String,
    name: String,
    #[serde(default)]
    specialty_tags: String,
    conversion_rate: f64,
    #[serde(default)]
    open_load: u32,
}

/// Parse `id,name,specialty_tags,conversion_rate,open_load` rows; tags are `;`-separated.
pub fn import_roster<R: Read>(reader: R) -> Result<Vec<Caseworker>, RosterImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut seen = HashSet::new();
    let mut roster = Vec::new();

    for (index, row) in csv_reader.deserialize::<RosterRow>().enumerate() {
        let row = row?;
        let line = index + 2;
        if row.id.is_empty() {
            return Err(RosterImportError::MissingId { row: line });
        }
        if !(0.0..=1.0).contains(&row.conversion_rate) {
            return Err(RosterImportError::InvalidConversionRate {
                row: line,
                value: row.conversion_rate,
            });
        }
        let id = CaseworkerId(row.id);
        if !seen.insert(id.clone()) {
            return Err(RosterImportError::DuplicateId(id));
        }

        roster.push(Caseworker {
            id,
            name: row.name,
            specialty_tags: row
                .specialty_tags
                .split(';')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
            conversion_rate: row.conversion_rate,
            open_load: row.open_load,
        });
    }

    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_rows_and_splits_tags() {
        let csv = "id,name,specialty_tags,conversion_rate,open_load\n\
                   cw-1,Lin Wei,high_tech; r&d,0.42,3\n\
                   cw-2,Zhao Min,,0.3,0\n";
        let roster = import_roster(csv.as_bytes()).expect("roster parses");
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].specialty_tags, vec!["high_tech", "r&d"]);
        assert!(roster[1].specialty_tags.is_empty());
    }

    #[test]
    fn rejects_out_of_range_conversion_rates() {
        let csv = "id,name,specialty_tags,conversion_rate,open_load\ncw-1,Lin,tag,1.4,1\n";
        match import_roster(csv.as_bytes()) {
            Err(RosterImportError::InvalidConversionRate { row: 2, .. }) => {}
            other => panic!("expected conversion rate error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let csv = "id,name,specialty_tags,conversion_rate,open_load\n\
                   cw-1,Lin,tag,0.4,1\n\
                   cw-1,Lin again,tag,0.4,1\n";
        assert!(matches!(
            import_roster(csv.as_bytes()),
            Err(RosterImportError::DuplicateId(_))
        ));
    }
}
