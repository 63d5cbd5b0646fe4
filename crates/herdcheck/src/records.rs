//! Registry record input: the JSON shape `herdcheck run` analyzes.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use herdcheck_core::{AnalysisInput, ContactDetails, Cph, CtsLid};
use serde::Deserialize;

/// One livestock record as exported from the reference registry.
///
/// Identity fields are validated while deserializing; everything else is
/// optional so the rules can flag what is missing.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryRecord {
    /// Lifetime identifier of the animal in the cattle tracing system.
    pub cts_lid: CtsLid,
    /// County/parish/holding number of the holding the animal is on.
    pub cph: Cph,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub keeper_emails: Vec<String>,
    #[serde(default)]
    pub keeper_phones: Vec<String>,
    #[serde(default)]
    pub region_code: Option<String>,
}

impl RegistryRecord {
    /// Keeper contact details, when the export carried any.
    #[must_use]
    pub fn contact(&self) -> Option<ContactDetails> {
        if self.keeper_emails.is_empty() && self.keeper_phones.is_empty() {
            return None;
        }
        Some(ContactDetails {
            emails: self.keeper_emails.clone(),
            phones: self.keeper_phones.clone(),
            region_code: self.region_code.clone(),
        })
    }
}

impl AnalysisInput for RegistryRecord {
    fn cts_lid(&self) -> &CtsLid {
        &self.cts_lid
    }

    fn cph(&self) -> &Cph {
        &self.cph
    }
}

/// Load a JSON array of registry records from disk.
pub fn load(path: &str) -> Result<Vec<RegistryRecord>> {
    let raw = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("cannot read record file '{path}'"))?;
    serde_json::from_str(&raw).with_context(|| format!("'{path}' is not a valid record file"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_minimal_record() {
        let record: RegistryRecord = serde_json::from_str(
            r#"{"cts_lid": "UK000000000001", "cph": "10/100/1000"}"#,
        )
        .expect("valid record");
        assert_eq!(record.cts_lid.as_str(), "UK000000000001");
        assert!(record.breed.is_none());
        assert!(record.contact().is_none());
    }

    #[test]
    fn contact_requires_at_least_one_channel() {
        let record: RegistryRecord = serde_json::from_str(
            r#"{
                "cts_lid": "UK000000000001",
                "cph": "10/100/1000",
                "keeper_emails": ["keeper@example.test"],
                "region_code": "SW"
            }"#,
        )
        .expect("valid record");
        let contact = record.contact().expect("contact present");
        assert_eq!(contact.emails, vec!["keeper@example.test".to_string()]);
        assert_eq!(contact.region_code.as_deref(), Some("SW"));
    }

    #[test]
    fn rejects_an_empty_identity() {
        let result: Result<RegistryRecord, _> =
            serde_json::from_str(r#"{"cts_lid": "", "cph": "10/100/1000"}"#);
        assert!(result.is_err());
    }
}
