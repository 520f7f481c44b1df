use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// 1-based position in the prompt list.
    pub index: usize,
    pub prompt: String,
    pub expected_count: usize,
}

impl RunRequest {
    pub fn from_prompts(prompts: &[String]) -> Vec<RunRequest> {
        prompts
            .iter()
            .enumerate()
            .map(|(i, p)| RunRequest { index: i + 1, prompt: p.clone(), expected_count: prompts.len() })
            .collect()
    }
}

/// One ledger record. Field names on disk follow the historical results format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    #[serde(rename = "test_number")]
    pub index: usize,
    pub prompt: String,
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    pub success: bool,
    #[serde(rename = "timestamp", with = "timestamp")]
    pub started_at: NaiveDateTime,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

pub(crate) mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&text, FORMAT).map_err(serde::de::Error::custom)
    }
}
