//! Record models: raw candidates from the page model and their canonical,
//! deduplicated form handed to downstream storage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version of the [`CanonicalRecord`] schema, independent of any page model.
pub const CANONICAL_SCHEMA_VERSION: u32 = 1;

/// Raw parsed output from the page-model collaborator.
///
/// May contain duplicates and structurally invalid entries; the dedup engine
/// is the only consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub date: Option<NaiveDate>,
    pub home: String,
    pub away: String,
    /// Raw result string as scraped, e.g. "3:1".
    pub result: Option<String>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub venue: Option<String>,
    /// Natural identifier if the source exposes one (match id, fixture slug).
    pub source_ref: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CandidateRecord {
    /// Stable serialized form used for exact-duplicate detection.
    pub fn content_hash(&self) -> String {
        let serialized = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(serialized.as_bytes());
        hex::encode(digest)
    }

    /// Key for similarity collapse: same participants, date and result,
    /// ignoring incidental fields.
    pub fn similarity_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.date.map(|d| d.to_string()).unwrap_or_default(),
            normalize_name(&self.home),
            normalize_name(&self.away),
            self.result.as_deref().unwrap_or(""),
        )
    }
}

/// Deduplicated, validated record with a stable identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub identity_key: String,
    pub date: NaiveDate,
    pub home: String,
    pub away: String,
    pub result: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub venue: Option<String>,
    pub source_ref: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub schema_version: u32,
}

impl CanonicalRecord {
    /// Composite identity over semantic fields: date, participants, venue.
    pub fn identity_key_for(
        date: NaiveDate,
        home: &str,
        away: &str,
        venue: Option<&str>,
    ) -> String {
        let material = format!(
            "{}|{}|{}|{}",
            date,
            normalize_name(home),
            normalize_name(away),
            venue.map(normalize_name).unwrap_or_default(),
        );
        let digest = Sha256::digest(material.as_bytes());
        hex::encode(&digest[..16])
    }
}

impl From<CanonicalRecord> for CandidateRecord {
    fn from(record: CanonicalRecord) -> Self {
        Self {
            date: Some(record.date),
            home: record.home,
            away: record.away,
            result: Some(record.result),
            home_score: record.home_score,
            away_score: record.away_score,
            venue: record.venue,
            source_ref: record.source_ref,
            metadata: serde_json::json!({}),
        }
    }
}

/// Normalize a participant or venue name for identity purposes.
fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(home: &str, away: &str) -> CandidateRecord {
        CandidateRecord {
            date: NaiveDate::from_ymd_opt(2025, 2, 11),
            home: home.to_string(),
            away: away.to_string(),
            result: Some("2:0".to_string()),
            home_score: Some(2),
            away_score: Some(0),
            venue: Some("City Arena".to_string()),
            source_ref: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_content_hash_stable() {
        let a = candidate("Alpha", "Beta");
        let b = candidate("Alpha", "Beta");
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_content_hash_differs_on_any_field() {
        let a = candidate("Alpha", "Beta");
        let mut b = candidate("Alpha", "Beta");
        b.venue = Some("Other Arena".to_string());
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_similarity_key_ignores_incidental_fields() {
        let a = candidate("Alpha", "Beta");
        let mut b = candidate("Alpha", "Beta");
        b.venue = None;
        b.metadata = serde_json::json!({"page": 3});
        assert_eq!(a.similarity_key(), b.similarity_key());
    }

    #[test]
    fn test_identity_key_normalizes_names() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 11).unwrap();
        let a = CanonicalRecord::identity_key_for(date, "Alpha FC", "Beta United", None);
        let b = CanonicalRecord::identity_key_for(date, "  alpha fc ", "BETA UNITED", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_key_distinguishes_venue() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 11).unwrap();
        let a = CanonicalRecord::identity_key_for(date, "Alpha", "Beta", Some("Arena A"));
        let b = CanonicalRecord::identity_key_for(date, "Alpha", "Beta", Some("Arena B"));
        assert_ne!(a, b);
    }
}
