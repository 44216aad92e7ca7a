use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use super::audio;
use super::model::AudioDataset;
use super::reader::{DATA_EXTENSIONS, DataTable, read_data_file};
use super::source::{DatasetSource, LoadOptions, VerificationMode};
use crate::progress;

/// Hub revision holding the automatic parquet conversion of every dataset.
pub const PARQUET_EXPORT_REVISION: &str = "refs/convert/parquet";

/// Configuration used by the parquet export when none is named.
const DEFAULT_CONFIG: &str = "default";

/// Bookkeeping files written next to data files.
const METADATA_FILES: &[&str] = &["dataset_info.json", "dataset_infos.json", "state.json"];

/// Split names the Hub treats as equivalent.
const SPLIT_ALIASES: &[&[&str]] = &[
    &["train", "training"],
    &["validation", "valid", "val", "dev"],
    &["test", "testing", "eval", "evaluation"],
];

// ---------------------------------------------------------------------------
// HubSource
// ---------------------------------------------------------------------------

/// [`DatasetSource`] backed by the Hugging Face Hub and the local filesystem.
#[derive(Debug, Clone)]
pub struct HubSource {
    cache_dir: Option<PathBuf>,
    token: Option<String>,
}

impl Default for HubSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HubSource {
    /// Picks up `HF_TOKEN` from the environment.
    pub fn new() -> Self {
        HubSource {
            cache_dir: None,
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    /// Store downloads under `path` instead of the default HF cache.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    fn api(&self) -> Result<Api> {
        let mut builder = ApiBuilder::new().with_progress(progress::progress_bars_enabled());
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        if self.token.is_some() {
            builder = builder.with_token(self.token.clone());
        }
        Ok(builder.build()?)
    }
}

impl DatasetSource for HubSource {
    fn load_local(&self, path: &Path, split: &str, options: &LoadOptions) -> Result<AudioDataset> {
        let files = list_local_files(path)?;
        let data_files = resolve_data_files(&files, None, split);
        if data_files.is_empty() {
            if has_loading_script(&files) {
                bail!(
                    "{} only provides a loading script; export it to parquet first",
                    path.display()
                );
            }
            bail!("No data files found for split '{split}' in {}", path.display());
        }
        log::debug!("split '{split}' resolved to {data_files:?}");

        let mut tables = Vec::with_capacity(data_files.len());
        for file in &data_files {
            tables.push((file.clone(), read_data_file(&path.join(file))?));
        }
        merge_tables(tables, options)
    }

    fn load_remote(
        &self,
        name: &str,
        sub_name: Option<&str>,
        split: &str,
        num_proc: usize,
        options: &LoadOptions,
    ) -> Result<AudioDataset> {
        let api = self.api()?;
        let mut repo = api.dataset(name.to_string());
        let files = repo_files(&repo)?;
        let mut data_files = resolve_data_files(&files, sub_name, split);

        if data_files.is_empty() && has_loading_script(&files) {
            if !options.trust_remote_code {
                bail!(
                    "Dataset '{name}' is defined by a loading script; \
                     enable trust_remote_code to read its parquet export"
                );
            }
            log::info!("'{name}' uses a loading script, reading its parquet export instead");
            repo = api.repo(Repo::with_revision(
                name.to_string(),
                RepoType::Dataset,
                PARQUET_EXPORT_REVISION.to_string(),
            ));
            let files = repo_files(&repo)?;
            data_files = resolve_data_files(&files, Some(sub_name.unwrap_or(DEFAULT_CONFIG)), split);
        }

        if data_files.is_empty() {
            bail!("No data files found for split '{split}' in dataset '{name}'");
        }
        log::debug!("split '{split}' resolved to {data_files:?}");

        let pool = ThreadPoolBuilder::new().num_threads(num_proc.max(1)).build()?;
        let pb = progress::progress_bar(data_files.len() as u64, "Downloading");
        let tables = pool.install(|| {
            data_files
                .par_iter()
                .map(|file| -> Result<(String, DataTable)> {
                    let local = repo
                        .get(file)
                        .with_context(|| format!("downloading {file}"))?;
                    pb.inc(1);
                    Ok((file.clone(), read_data_file(&local)?))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        pb.finish_and_clear();

        merge_tables(tables, options)
    }

    fn cast_audio_column(
        &self,
        dataset: AudioDataset,
        column: &str,
        sample_rate: u32,
    ) -> Result<AudioDataset> {
        audio::cast_audio_column(dataset, column, sample_rate)
    }
}

fn repo_files(repo: &ApiRepo) -> Result<Vec<String>> {
    let info = repo.info()?;
    Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
}

/// Relative, `/`-separated paths of every file under `dir`.
fn list_local_files(dir: &Path) -> Result<Vec<String>> {
    let root = dir.to_str().context("dataset path is not valid UTF-8")?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(root));

    let mut files = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(dir) {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(parts.join("/"));
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenate per-file tables in order.
fn merge_tables(tables: Vec<(String, DataTable)>, options: &LoadOptions) -> Result<AudioDataset> {
    let mut column_names: Vec<String> = Vec::new();
    let mut records = Vec::new();

    for (i, (file, table)) in tables.into_iter().enumerate() {
        if i == 0 {
            column_names = table.column_names;
        } else if options.verification_mode == VerificationMode::BasicChecks
            && !same_columns(&column_names, &table.column_names)
        {
            bail!(
                "{file} has columns {:?}, expected {:?}",
                table.column_names,
                column_names
            );
        } else {
            for col in table.column_names {
                if !column_names.contains(&col) {
                    column_names.push(col);
                }
            }
        }
        records.extend(table.records);
    }

    Ok(AudioDataset::new(column_names, records))
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

// ---------------------------------------------------------------------------
// Data-file resolution
// ---------------------------------------------------------------------------

/// Pick the data files of `split` (and of configuration `config`, if any).
///
/// A file belongs to a split when one of its directories is named after the
/// split or its file name starts with the split name (`train-00000-of-00001`).
/// When no file names any known split, everything is `train`.
pub fn resolve_data_files(files: &[String], config: Option<&str>, split: &str) -> Vec<String> {
    let candidates: Vec<&String> = files
        .iter()
        .filter(|f| is_data_file(f))
        .filter(|f| config.map_or(true, |c| in_directory(f, c)))
        .collect();

    let mut matched: Vec<String> = candidates
        .iter()
        .filter(|f| matches_split(f, split))
        .map(|f| f.to_string())
        .collect();

    if matched.is_empty()
        && split_aliases(split).contains(&"train")
        && !candidates.iter().any(|f| names_any_split(f))
    {
        matched = candidates.iter().map(|f| f.to_string()).collect();
    }

    matched.sort();
    matched
}

/// Whether a repo root carries a dataset loading script.
pub fn has_loading_script(files: &[String]) -> bool {
    files.iter().any(|f| !f.contains('/') && f.ends_with(".py"))
}

fn is_data_file(file: &str) -> bool {
    if file.split('/').any(|part| part.starts_with('.')) {
        return false;
    }
    let name = file.rsplit('/').next().unwrap_or(file);
    if METADATA_FILES.contains(&name) {
        return false;
    }
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    DATA_EXTENSIONS.contains(&ext.as_str())
}

fn in_directory(file: &str, dir: &str) -> bool {
    let mut parts: Vec<&str> = file.split('/').collect();
    parts.pop();
    parts.contains(&dir)
}

fn split_aliases(split: &str) -> Vec<&str> {
    SPLIT_ALIASES
        .iter()
        .find(|group| group.contains(&split))
        .map(|group| group.to_vec())
        .unwrap_or_else(|| vec![split])
}

fn matches_split(file: &str, split: &str) -> bool {
    split_aliases(split)
        .iter()
        .any(|alias| names_split(file, alias))
}

fn names_any_split(file: &str) -> bool {
    SPLIT_ALIASES
        .iter()
        .flat_map(|group| group.iter())
        .any(|alias| names_split(file, alias))
}

fn names_split(file: &str, split: &str) -> bool {
    let mut parts: Vec<&str> = file.split('/').collect();
    let file_name = parts.pop().unwrap_or("");
    if parts.contains(&split) {
        return true;
    }
    let stem = file_name.split('.').next().unwrap_or("");
    stem == split
        || stem.starts_with(&format!("{split}-"))
        || stem.starts_with(&format!("{split}_"))
}
