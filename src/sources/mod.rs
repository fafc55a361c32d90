//! Built-in collaborator implementations.
//!
//! The acquisition core consumes parsing, freshness and storage through
//! narrow traits; these are the configuration-driven defaults the CLI wires
//! in. Markup knowledge stays here, expressed as per-partition regex
//! patterns in the settings file; the core never sees a selector.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, warn};

use crate::acquire::retry::PageFetcher;
use crate::acquire::AcquireError;
use crate::config::Settings;
use crate::models::{CandidateRecord, CanonicalRecord};
use crate::runner::{FreshnessProbe, LocalState, PageModel, PartitionSpec, RecordSink};
use crate::state::StateStore;

/// Per-partition compiled extraction patterns.
#[derive(Debug)]
struct PartitionPatterns {
    record: Option<Regex>,
    latest_date: Option<Regex>,
    date_format: String,
}

fn compile_patterns(settings: &Settings) -> Result<HashMap<String, PartitionPatterns>, AcquireError> {
    let mut map = HashMap::new();
    for (id, entry) in &settings.partitions {
        let record = entry
            .record_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| AcquireError::Config(format!("partition {id}: bad record_pattern: {e}")))?;
        let latest_date = entry
            .latest_date_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                AcquireError::Config(format!("partition {id}: bad latest_date_pattern: {e}"))
            })?;
        map.insert(
            id.clone(),
            PartitionPatterns {
                record,
                latest_date,
                date_format: entry.date_format.clone(),
            },
        );
    }
    Ok(map)
}

/// Page model driven by per-partition record patterns.
#[derive(Debug)]
pub struct RegexPageModel {
    patterns: HashMap<String, PartitionPatterns>,
}

impl RegexPageModel {
    pub fn from_settings(settings: &Settings) -> Result<Self, AcquireError> {
        Ok(Self {
            patterns: compile_patterns(settings)?,
        })
    }
}

impl PageModel for RegexPageModel {
    fn parse(
        &self,
        body: &str,
        partition: &PartitionSpec,
    ) -> Result<Vec<CandidateRecord>, AcquireError> {
        let Some(patterns) = self.patterns.get(&partition.id) else {
            return Ok(Vec::new());
        };
        let Some(record_re) = &patterns.record else {
            warn!(partition = %partition.id, "no record_pattern configured, page yields nothing");
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for captures in record_re.captures_iter(body) {
            let group = |name: &str| {
                captures
                    .name(name)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|s| !s.is_empty())
            };

            let date = group("date")
                .and_then(|raw| NaiveDate::parse_from_str(&raw, &patterns.date_format).ok());
            let home_score = group("home_score").and_then(|s| s.parse().ok());
            let away_score = group("away_score").and_then(|s| s.parse().ok());
            let result = match (home_score, away_score) {
                (Some(h), Some(a)) => Some(format!("{h}:{a}")),
                _ => None,
            };

            records.push(CandidateRecord {
                date,
                home: group("home").unwrap_or_default(),
                away: group("away").unwrap_or_default(),
                result,
                home_score,
                away_score,
                venue: group("venue"),
                source_ref: group("ref"),
                metadata: serde_json::json!({}),
            });
        }
        debug!(partition = %partition.id, records = records.len(), "extracted candidates");
        Ok(records)
    }
}

/// Freshness probe that fetches the partition index page through the same
/// retry controller as every other request and extracts the newest date.
#[derive(Debug)]
pub struct RegexFreshnessProbe {
    patterns: HashMap<String, PartitionPatterns>,
}

impl RegexFreshnessProbe {
    pub fn from_settings(settings: &Settings) -> Result<Self, AcquireError> {
        Ok(Self {
            patterns: compile_patterns(settings)?,
        })
    }
}

#[async_trait]
impl FreshnessProbe for RegexFreshnessProbe {
    async fn remote_latest(
        &self,
        fetcher: &mut dyn PageFetcher,
        partition: &PartitionSpec,
    ) -> Result<Option<NaiveDate>, AcquireError> {
        let Some(patterns) = self.patterns.get(&partition.id) else {
            return Err(AcquireError::FreshnessUnknown);
        };
        let Some(latest_re) = &patterns.latest_date else {
            return Err(AcquireError::FreshnessUnknown);
        };

        let body = match fetcher
            .fetch_with_retry(&partition.index_url, &partition.required_markers)
            .await
        {
            Ok(body) => body,
            // An exhausted pool is a hard stop, not an unknown.
            Err(AcquireError::PoolExhausted) => return Err(AcquireError::PoolExhausted),
            Err(e) => {
                debug!(partition = %partition.id, error = %e, "freshness check failed");
                return Err(AcquireError::FreshnessUnknown);
            }
        };

        let latest = latest_re
            .captures_iter(&body)
            .filter_map(|c| c.name("date"))
            .filter_map(|m| NaiveDate::parse_from_str(m.as_str().trim(), &patterns.date_format).ok())
            .max();
        Ok(latest)
    }
}

/// Local state backed by the operational state database's progress table.
#[derive(Debug)]
pub struct StoreLocalState {
    db_path: PathBuf,
}

impl StoreLocalState {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

impl LocalState for StoreLocalState {
    fn local_latest(&self, partition: &str) -> Result<Option<NaiveDate>, AcquireError> {
        let store = StateStore::open(&self.db_path)?;
        store.latest_record_date(partition)
    }
}

/// Record sink appending canonical records as JSON lines, one file per
/// partition, for the downstream importer to consume.
#[derive(Debug)]
pub struct JsonLinesSink {
    data_dir: PathBuf,
}

impl JsonLinesSink {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn path_for(&self, partition: &str) -> PathBuf {
        self.data_dir.join(format!("{partition}-records.jsonl"))
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn emit(
        &self,
        partition: &str,
        records: &[CanonicalRecord],
    ) -> Result<(), AcquireError> {
        let path = self.path_for(partition);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AcquireError::Config(format!("opening {}: {e}", path.display())))?;
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| AcquireError::Config(format!("serializing record: {e}")))?;
            writeln!(file, "{line}")
                .map_err(|e| AcquireError::Config(format!("writing {}: {e}", path.display())))?;
        }
        debug!(partition, records = records.len(), path = %path.display(), "records emitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_pattern() -> Settings {
        let raw = r#"
            [partitions.league-1]
            index_url = "https://results.example.com/league-1"
            page_url_template = "https://results.example.com/league-1/day/{date}"
            record_pattern = '(?s)<tr class="match" data-id="(?P<ref>\d+)".*?date">(?P<date>\d{4}-\d{2}-\d{2})<.*?home">(?P<home>[^<]+)<.*?away">(?P<away>[^<]+)<.*?score">(?P<home_score>\d+):(?P<away_score>\d+)<.*?</tr>'
            latest_date_pattern = 'data-latest="(?P<date>\d{4}-\d{2}-\d{2})"'
        "#;
        toml::from_str(raw).unwrap()
    }

    fn spec(settings: &Settings) -> PartitionSpec {
        settings.partition_spec("league-1").unwrap()
    }

    #[test]
    fn test_regex_page_model_extracts_records() {
        let settings = settings_with_pattern();
        let model = RegexPageModel::from_settings(&settings).unwrap();
        let body = r#"
            <tr class="match" data-id="100"><td class="date">2025-02-12</td>
            <td class="home">Alpha</td><td class="away">Beta</td>
            <td class="score">2:1</td></tr>
            <tr class="match" data-id="101"><td class="date">2025-02-12</td>
            <td class="home">Gamma</td><td class="away">Delta</td>
            <td class="score">0:0</td></tr>
        "#;
        let records = model.parse(body, &spec(&settings)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].home, "Alpha");
        assert_eq!(records[0].away, "Beta");
        assert_eq!(records[0].home_score, Some(2));
        assert_eq!(records[0].result.as_deref(), Some("2:1"));
        assert_eq!(records[0].source_ref.as_deref(), Some("100"));
        assert_eq!(
            records[0].date,
            NaiveDate::from_ymd_opt(2025, 2, 12)
        );
    }

    #[test]
    fn test_page_model_without_pattern_yields_nothing() {
        let mut settings = settings_with_pattern();
        settings
            .partitions
            .get_mut("league-1")
            .unwrap()
            .record_pattern = None;
        let model = RegexPageModel::from_settings(&settings).unwrap();
        let records = model.parse("<html></html>", &spec(&settings)).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let mut settings = settings_with_pattern();
        settings
            .partitions
            .get_mut("league-1")
            .unwrap()
            .record_pattern = Some("(unclosed".to_string());
        assert!(matches!(
            RegexPageModel::from_settings(&settings),
            Err(AcquireError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().to_path_buf());
        let record = CanonicalRecord {
            identity_key: "abc".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 2, 12).unwrap(),
            home: "Alpha".to_string(),
            away: "Beta".to_string(),
            result: "2:1".to_string(),
            home_score: Some(2),
            away_score: Some(1),
            venue: None,
            source_ref: None,
            acquired_at: chrono::Utc::now(),
            schema_version: 1,
        };
        sink.emit("league-1", &[record.clone()]).await.unwrap();
        sink.emit("league-1", &[record]).await.unwrap();

        let contents =
            std::fs::read_to_string(dir.path().join("league-1-records.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"home\":\"Alpha\""));
    }

    #[test]
    fn test_store_local_state_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");
        let store = StateStore::open(&db).unwrap();
        store
            .advance_progress("league-1", NaiveDate::from_ymd_opt(2025, 2, 11).unwrap())
            .unwrap();

        let local = StoreLocalState::new(db);
        assert_eq!(
            local.local_latest("league-1").unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 11)
        );
        assert_eq!(local.local_latest("other").unwrap(), None);
    }
}
