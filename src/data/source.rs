use std::path::Path;

use anyhow::Result;

use super::model::AudioDataset;

/// How strictly a source checks what it loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// Accept the files as they are.
    NoChecks,
    /// All data files of a split must share one set of columns.
    #[default]
    BasicChecks,
}

/// Flags forwarded to every [`DatasetSource`] load call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub verification_mode: VerificationMode,
    /// Allow datasets that are defined by their own loading code.
    pub trust_remote_code: bool,
}

impl LoadOptions {
    /// No verification, remote code allowed.
    pub const fn permissive() -> Self {
        LoadOptions {
            verification_mode: VerificationMode::NoChecks,
            trust_remote_code: true,
        }
    }
}

/// Retrieves dataset splits and decodes their audio column.
///
/// Errors are returned as-is to the caller of the loader.
pub trait DatasetSource {
    /// Load `split` from a dataset stored in a local directory.
    fn load_local(&self, path: &Path, split: &str, options: &LoadOptions) -> Result<AudioDataset>;

    /// Load `split` of the hub dataset `name`, optionally restricted to the
    /// configuration `sub_name`, using up to `num_proc` workers.
    fn load_remote(
        &self,
        name: &str,
        sub_name: Option<&str>,
        split: &str,
        num_proc: usize,
        options: &LoadOptions,
    ) -> Result<AudioDataset>;

    /// Decode `column` into mono audio at `sample_rate`.
    fn cast_audio_column(
        &self,
        dataset: AudioDataset,
        column: &str,
        sample_rate: u32,
    ) -> Result<AudioDataset>;
}
