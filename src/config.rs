use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::data::model::FieldValue;
use crate::data::reader::json_to_field;

// ---------------------------------------------------------------------------
// Dataset configuration
// ---------------------------------------------------------------------------

/// Identifies a dataset split and maps its columns onto prepared items.
///
/// ```json
/// {
///   "name": "org/speech-corpus",
///   "sub_name": "en",
///   "split": "train",
///   "audio_column_name": "audio",
///   "text_column_name": "sentence",
///   "speaker_column_name": "client_id",
///   "constant_columns": { "lang": "en" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Hub dataset id, or a local directory.
    pub name: String,
    #[serde(default)]
    pub sub_name: Option<String>,
    pub split: String,
    pub audio_column_name: String,
    pub text_column_name: String,
    #[serde(default)]
    pub speaker_column_name: Option<String>,
    /// Fields attached verbatim to every prepared item.
    #[serde(default)]
    pub constant_columns: BTreeMap<String, JsonValue>,
}

impl DatasetConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Dataset configuration name, if one is set.
    pub fn sub_name(&self) -> Option<&str> {
        self.sub_name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn speaker_column(&self) -> Option<&str> {
        self.speaker_column_name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn constant_columns(&self) -> BTreeMap<String, FieldValue> {
        self.constant_columns
            .iter()
            .map(|(k, v)| (k.clone(), json_to_field(v)))
            .collect()
    }

    /// `name (sub_name) [split]`, for progress messages.
    pub fn description(&self) -> String {
        let mut desc = self.name.clone();
        if let Some(sub) = self.sub_name() {
            desc.push_str(&format!(" ({sub})"));
        }
        desc.push_str(&format!(" [{}]", self.split));
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: DatasetConfig = serde_json::from_str(
            r#"{
                "name": "org/corpus",
                "sub_name": "en",
                "split": "train",
                "audio_column_name": "audio",
                "text_column_name": "sentence",
                "speaker_column_name": "client_id",
                "constant_columns": {"lang": "en", "weight": 2}
            }"#,
        )
        .unwrap();

        assert_eq!(config.sub_name(), Some("en"));
        assert_eq!(config.speaker_column(), Some("client_id"));
        assert_eq!(config.description(), "org/corpus (en) [train]");

        let constants = config.constant_columns();
        assert_eq!(constants["lang"], FieldValue::String("en".into()));
        assert_eq!(constants["weight"], FieldValue::Integer(2));
    }

    #[test]
    fn test_optional_fields_default_to_absent() {
        let config: DatasetConfig = serde_json::from_str(
            r#"{
                "name": "data/local",
                "sub_name": "",
                "split": "test",
                "audio_column_name": "audio",
                "text_column_name": "text",
                "speaker_column_name": ""
            }"#,
        )
        .unwrap();

        assert_eq!(config.sub_name(), None);
        assert_eq!(config.speaker_column(), None);
        assert!(config.constant_columns().is_empty());
        assert_eq!(config.description(), "data/local [test]");
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let result: std::result::Result<DatasetConfig, _> =
            serde_json::from_str(r#"{"name": "x", "split": "train"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{"name": "n", "split": "s", "audio_column_name": "a", "text_column_name": "t"}"#,
        )
        .unwrap();
        let config = DatasetConfig::from_file(&path).unwrap();
        assert_eq!(config.name, "n");
        assert!(DatasetConfig::from_file(&dir.path().join("missing.json")).is_err());
    }
}
