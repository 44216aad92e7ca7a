use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::error::DatasetError;
use super::hub::HubSource;
use super::model::{AudioDataset, FieldValue, PreparedItem, Record};
use super::source::{DatasetSource, LoadOptions};
use crate::config::DatasetConfig;

/// Sample rate audio is decoded at unless the caller picks another.
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

/// Download/parse workers used for hub datasets by default.
pub const DEFAULT_NUM_PROC: usize = 5;

// ---------------------------------------------------------------------------
// DatasetLoader
// ---------------------------------------------------------------------------

/// Loads the configured split and turns its records into [`PreparedItem`]s.
///
/// `config.name` is a local dataset when it names an existing directory at
/// load time, and a hub dataset id otherwise.
pub struct DatasetLoader<S = HubSource> {
    config: DatasetConfig,
    constants: BTreeMap<String, FieldValue>,
    sample_rate: u32,
    source: S,
    dataset: Option<Arc<AudioDataset>>,
}

impl DatasetLoader<HubSource> {
    pub fn new(config: DatasetConfig, sample_rate: u32) -> Self {
        Self::with_source(config, sample_rate, HubSource::new())
    }
}

impl<S: DatasetSource> DatasetLoader<S> {
    pub fn with_source(config: DatasetConfig, sample_rate: u32, source: S) -> Self {
        let constants = config.constant_columns();
        DatasetLoader {
            config,
            constants,
            sample_rate,
            source,
            dataset: None,
        }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load the configured split and decode its audio column.
    ///
    /// Local directories are read without the configuration name and without
    /// `num_proc`. Source errors are returned unchanged; on failure the
    /// previously loaded dataset, if any, is kept.
    pub fn load(&mut self, num_proc: usize) -> Result<()> {
        let options = LoadOptions::permissive();
        let path = Path::new(&self.config.name);
        let local = path.is_dir();

        for line in loading_lines(&self.config, local) {
            println!("{line}");
        }

        let dataset = if local {
            self.source.load_local(path, &self.config.split, &options)?
        } else {
            self.source.load_remote(
                &self.config.name,
                self.config.sub_name(),
                &self.config.split,
                num_proc,
                &options,
            )?
        };

        let dataset = self.source.cast_audio_column(
            dataset,
            &self.config.audio_column_name,
            self.sample_rate,
        )?;

        println!("{}", loaded_line(&self.config, dataset.len()));
        self.dataset = Some(Arc::new(dataset));
        Ok(())
    }

    /// The loaded dataset.
    pub fn dataset(&self) -> Result<&Arc<AudioDataset>, DatasetError> {
        self.dataset.as_ref().ok_or(DatasetError::NotLoaded)
    }

    /// Map one record onto `text`, `wave`, optional `speaker` and the
    /// constant fields. Constants are applied last and win on key clashes.
    pub fn prepare_item(&self, record: &Record) -> Result<PreparedItem, DatasetError> {
        let text = lookup(record, &self.config.text_column_name)?;

        let audio_column = &self.config.audio_column_name;
        let wave = match lookup(record, audio_column)? {
            FieldValue::Audio(audio) => audio.array.clone(),
            FieldValue::Struct(fields) => fields
                .get("array")
                .ok_or_else(|| DatasetError::MissingColumn(format!("{audio_column}.array")))?
                .to_samples()
                .ok_or_else(|| DatasetError::InvalidAudio(format!("{audio_column}.array")))?,
            _ => return Err(DatasetError::InvalidAudio(audio_column.clone())),
        };

        let mut item = PreparedItem::new();
        item.insert("text".to_string(), text.clone());
        item.insert("wave".to_string(), FieldValue::Wave(wave));

        if let Some(speaker_column) = self.config.speaker_column() {
            item.insert("speaker".to_string(), lookup(record, speaker_column)?.clone());
        }

        item.extend(self.constants.clone());
        Ok(item)
    }

    /// Prepare every record of the loaded dataset, in order.
    pub fn prepared_items(
        &self,
    ) -> Result<impl Iterator<Item = Result<PreparedItem, DatasetError>> + '_, DatasetError> {
        let dataset = self.dataset()?;
        Ok(dataset.iter().map(move |record| self.prepare_item(record)))
    }
}

/// Announces what is about to be loaded; local loads also name the path.
fn loading_lines(config: &DatasetConfig, local: bool) -> Vec<String> {
    let desc = config.description();
    if local {
        vec![
            format!("Loading local dataset: {desc}"),
            format!("   Path: {}", config.name),
        ]
    } else {
        vec![format!("Loading Hugging Face dataset: {desc}")]
    }
}

fn loaded_line(config: &DatasetConfig, count: usize) -> String {
    format!("  Loaded {count} samples from {}", config.description())
}

fn lookup<'a>(record: &'a Record, column: &str) -> Result<&'a FieldValue, DatasetError> {
    record
        .get(column)
        .ok_or_else(|| DatasetError::MissingColumn(column.to_string()))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::data::model::AudioData;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Local {
            path: PathBuf,
            split: String,
            options: LoadOptions,
        },
        Remote {
            name: String,
            sub_name: Option<String>,
            split: String,
            num_proc: usize,
            options: LoadOptions,
        },
        Cast {
            column: String,
            sample_rate: u32,
        },
    }

    /// Records every call and hands back a fixed dataset.
    struct StubSource {
        calls: RefCell<Vec<Call>>,
        dataset: AudioDataset,
        fail_with: Option<String>,
    }

    impl StubSource {
        fn new(dataset: AudioDataset) -> Self {
            StubSource {
                calls: RefCell::new(Vec::new()),
                dataset,
                fail_with: None,
            }
        }

        fn failing(message: &str) -> Self {
            StubSource {
                fail_with: Some(message.to_string()),
                ..Self::new(AudioDataset::default())
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn result(&self) -> Result<AudioDataset> {
            match &self.fail_with {
                Some(message) => Err(anyhow::anyhow!("{message}")),
                None => Ok(self.dataset.clone()),
            }
        }
    }

    impl DatasetSource for StubSource {
        fn load_local(
            &self,
            path: &Path,
            split: &str,
            options: &LoadOptions,
        ) -> Result<AudioDataset> {
            self.calls.borrow_mut().push(Call::Local {
                path: path.to_path_buf(),
                split: split.to_string(),
                options: *options,
            });
            self.result()
        }

        fn load_remote(
            &self,
            name: &str,
            sub_name: Option<&str>,
            split: &str,
            num_proc: usize,
            options: &LoadOptions,
        ) -> Result<AudioDataset> {
            self.calls.borrow_mut().push(Call::Remote {
                name: name.to_string(),
                sub_name: sub_name.map(str::to_string),
                split: split.to_string(),
                num_proc,
                options: *options,
            });
            self.result()
        }

        fn cast_audio_column(
            &self,
            dataset: AudioDataset,
            column: &str,
            sample_rate: u32,
        ) -> Result<AudioDataset> {
            self.calls.borrow_mut().push(Call::Cast {
                column: column.to_string(),
                sample_rate,
            });
            Ok(dataset)
        }
    }

    fn config(name: &str) -> DatasetConfig {
        DatasetConfig {
            name: name.to_string(),
            sub_name: Some("en".to_string()),
            split: "train".to_string(),
            audio_column_name: "audio_col".to_string(),
            text_column_name: "text_col".to_string(),
            speaker_column_name: None,
            constant_columns: BTreeMap::new(),
        }
    }

    fn record(value: serde_json::Value) -> Record {
        match crate::data::reader::json_to_field(&value) {
            FieldValue::Struct(fields) => fields,
            other => panic!("expected an object, got {other:?}"),
        }
    }

    fn sample_record() -> Record {
        record(json!({
            "text_col": "hello",
            "audio_col": {"array": [0.1, 0.2], "sampling_rate": 22050},
            "spk_col": "S1",
        }))
    }

    fn sample_dataset() -> AudioDataset {
        AudioDataset::from_records(vec![sample_record(), sample_record()])
    }

    const MISSING_DIR: &str = "org/definitely-not-a-local-directory";

    #[test]
    fn test_local_directory_takes_local_branch() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().to_string_lossy().into_owned();
        let mut loader =
            DatasetLoader::with_source(config(&name), 16000, StubSource::new(sample_dataset()));

        loader.load(8).unwrap();

        assert_eq!(
            loader.source().calls(),
            vec![
                Call::Local {
                    path: dir.path().to_path_buf(),
                    split: "train".to_string(),
                    options: LoadOptions::permissive(),
                },
                Call::Cast {
                    column: "audio_col".to_string(),
                    sample_rate: 16000,
                },
            ]
        );
    }

    #[test]
    fn test_remote_name_takes_remote_branch() {
        let mut loader = DatasetLoader::with_source(
            config(MISSING_DIR),
            DEFAULT_SAMPLE_RATE,
            StubSource::new(sample_dataset()),
        );

        loader.load(3).unwrap();

        assert_eq!(
            loader.source().calls(),
            vec![
                Call::Remote {
                    name: MISSING_DIR.to_string(),
                    sub_name: Some("en".to_string()),
                    split: "train".to_string(),
                    num_proc: 3,
                    options: LoadOptions::permissive(),
                },
                Call::Cast {
                    column: "audio_col".to_string(),
                    sample_rate: 22050,
                },
            ]
        );
    }

    #[test]
    fn test_remote_branch_without_sub_name() {
        let mut cfg = config(MISSING_DIR);
        cfg.sub_name = None;
        let mut loader = DatasetLoader::with_source(cfg, 22050, StubSource::new(sample_dataset()));
        loader.load(DEFAULT_NUM_PROC).unwrap();

        match &loader.source().calls()[0] {
            Call::Remote {
                sub_name, num_proc, ..
            } => {
                assert_eq!(*sub_name, None);
                assert_eq!(*num_proc, DEFAULT_NUM_PROC);
            }
            other => panic!("expected remote load, got {other:?}"),
        }
    }

    #[test]
    fn test_loading_options_are_permissive() {
        let options = LoadOptions::permissive();
        assert_eq!(
            options.verification_mode,
            crate::data::source::VerificationMode::NoChecks
        );
        assert!(options.trust_remote_code);
    }

    #[test]
    fn test_progress_lines() {
        assert_eq!(
            loading_lines(&config("data/corpus"), true),
            vec![
                "Loading local dataset: data/corpus (en) [train]",
                "   Path: data/corpus",
            ]
        );
        assert_eq!(
            loading_lines(&config("org/corpus"), false),
            vec!["Loading Hugging Face dataset: org/corpus (en) [train]"]
        );

        let mut cfg = config("org/corpus");
        cfg.sub_name = None;
        assert_eq!(
            loaded_line(&cfg, 42),
            "  Loaded 42 samples from org/corpus [train]"
        );
    }

    #[test]
    fn test_dataset_before_load_fails() {
        let loader = DatasetLoader::with_source(
            config(MISSING_DIR),
            22050,
            StubSource::new(sample_dataset()),
        );
        assert_eq!(loader.dataset().unwrap_err(), DatasetError::NotLoaded);
        assert!(loader.prepared_items().is_err());
    }

    #[test]
    fn test_dataset_after_load_is_source_dataset() {
        let expected = sample_dataset();
        let mut loader =
            DatasetLoader::with_source(config(MISSING_DIR), 22050, StubSource::new(expected.clone()));
        loader.load(1).unwrap();

        let dataset = loader.dataset().unwrap();
        assert_eq!(dataset.len(), expected.len());
        assert_eq!(**dataset, expected);
    }

    #[test]
    fn test_reload_replaces_dataset() {
        let mut loader = DatasetLoader::with_source(
            config(MISSING_DIR),
            22050,
            StubSource::new(sample_dataset()),
        );
        loader.load(1).unwrap();
        let first = Arc::clone(loader.dataset().unwrap());
        loader.load(1).unwrap();
        assert!(!Arc::ptr_eq(&first, loader.dataset().unwrap()));
    }

    #[test]
    fn test_source_errors_propagate_unchanged() {
        let mut loader = DatasetLoader::with_source(
            config(MISSING_DIR),
            22050,
            StubSource::failing("split 'train' not found"),
        );
        let err = loader.load(1).unwrap_err();
        assert_eq!(format!("{err:#}"), "split 'train' not found");
        assert_eq!(loader.dataset().unwrap_err(), DatasetError::NotLoaded);
        // nothing is cast when loading fails
        assert_eq!(loader.source().calls().len(), 1);
    }

    #[test]
    fn test_prepare_item_text_wave_and_constants() {
        let mut cfg = config(MISSING_DIR);
        cfg.constant_columns.insert("lang".to_string(), json!("en"));
        let loader = DatasetLoader::with_source(cfg, 22050, StubSource::new(sample_dataset()));

        let input = record(json!({
            "text_col": "hello",
            "audio_col": {"array": [0.1, 0.2], "sampling_rate": 22050},
        }));
        let item = loader.prepare_item(&input).unwrap();

        let expected: PreparedItem = [
            ("text".to_string(), FieldValue::String("hello".into())),
            ("wave".to_string(), FieldValue::Wave(vec![0.1, 0.2])),
            ("lang".to_string(), FieldValue::String("en".into())),
        ]
        .into_iter()
        .collect();
        assert_eq!(item, expected);
    }

    #[test]
    fn test_prepare_item_adds_speaker() {
        let mut cfg = config(MISSING_DIR);
        cfg.speaker_column_name = Some("spk_col".to_string());
        let loader = DatasetLoader::with_source(cfg, 22050, StubSource::new(sample_dataset()));

        let item = loader.prepare_item(&sample_record()).unwrap();
        assert_eq!(item["speaker"], FieldValue::String("S1".into()));
        assert_eq!(item.len(), 3);
    }

    #[test]
    fn test_constants_override_extracted_fields() {
        let mut cfg = config(MISSING_DIR);
        cfg.speaker_column_name = Some("spk_col".to_string());
        cfg.constant_columns.insert("text".to_string(), json!("fixed"));
        cfg.constant_columns.insert("wave".to_string(), json!(null));
        cfg.constant_columns.insert("speaker".to_string(), json!("narrator"));
        let loader = DatasetLoader::with_source(cfg, 22050, StubSource::new(sample_dataset()));

        let item = loader.prepare_item(&sample_record()).unwrap();
        assert_eq!(item["text"], FieldValue::String("fixed".into()));
        assert_eq!(item["wave"], FieldValue::Null);
        assert_eq!(item["speaker"], FieldValue::String("narrator".into()));
    }

    #[test]
    fn test_prepare_item_reads_decoded_audio() {
        let loader = DatasetLoader::with_source(
            config(MISSING_DIR),
            22050,
            StubSource::new(sample_dataset()),
        );
        let mut input = sample_record();
        input.insert(
            "audio_col".to_string(),
            FieldValue::Audio(AudioData {
                path: Some("clip.wav".into()),
                array: vec![0.5, -0.5, 0.25],
                sampling_rate: 22050,
            }),
        );

        let item = loader.prepare_item(&input).unwrap();
        assert_eq!(item["wave"], FieldValue::Wave(vec![0.5, -0.5, 0.25]));
    }

    #[test]
    fn test_prepare_item_missing_columns() {
        let mut cfg = config(MISSING_DIR);
        cfg.speaker_column_name = Some("who".to_string());
        let loader = DatasetLoader::with_source(cfg, 22050, StubSource::new(sample_dataset()));

        assert_eq!(
            loader.prepare_item(&sample_record()).unwrap_err(),
            DatasetError::MissingColumn("who".to_string())
        );

        let no_text = record(json!({"audio_col": {"array": [], "sampling_rate": 1}}));
        assert_eq!(
            loader.prepare_item(&no_text).unwrap_err(),
            DatasetError::MissingColumn("text_col".to_string())
        );

        let no_array = record(json!({"text_col": "x", "audio_col": {"path": "a.wav"}}));
        assert_eq!(
            loader.prepare_item(&no_array).unwrap_err(),
            DatasetError::MissingColumn("audio_col.array".to_string())
        );
    }

    #[test]
    fn test_prepare_item_rejects_non_audio() {
        let loader = DatasetLoader::with_source(
            config(MISSING_DIR),
            22050,
            StubSource::new(sample_dataset()),
        );
        let input = record(json!({"text_col": "x", "audio_col": "clip.wav"}));
        assert_eq!(
            loader.prepare_item(&input).unwrap_err(),
            DatasetError::InvalidAudio("audio_col".to_string())
        );
    }

    #[test]
    fn test_prepared_items_cover_dataset() {
        let mut loader = DatasetLoader::with_source(
            config(MISSING_DIR),
            22050,
            StubSource::new(sample_dataset()),
        );
        loader.load(1).unwrap();

        let items: Vec<PreparedItem> = loader
            .prepared_items()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items
            .iter()
            .all(|item| item["text"] == FieldValue::String("hello".into())));
    }
}
