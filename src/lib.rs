//! Load audio/text datasets from the Hugging Face Hub or a local directory
//! and prepare flat training records.
//!
//! ```no_run
//! use speech_dataset_prep::config::DatasetConfig;
//! use speech_dataset_prep::data::loader::{DatasetLoader, DEFAULT_NUM_PROC, DEFAULT_SAMPLE_RATE};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = DatasetConfig::from_file("dataset.json".as_ref())?;
//! let mut loader = DatasetLoader::new(config, DEFAULT_SAMPLE_RATE);
//! loader.load(DEFAULT_NUM_PROC)?;
//! for item in loader.prepared_items()? {
//!     let item = item?;
//!     println!("{}", item["text"]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod progress;
