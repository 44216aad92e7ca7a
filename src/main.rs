use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;

use speech_dataset_prep::config::DatasetConfig;
use speech_dataset_prep::data::hub::HubSource;
use speech_dataset_prep::data::loader::{DEFAULT_NUM_PROC, DEFAULT_SAMPLE_RATE, DatasetLoader};
use speech_dataset_prep::progress;

/// Load a dataset split and write its prepared items as JSON Lines.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Dataset config file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured split
    #[arg(long)]
    split: Option<String>,

    /// Sample rate audio is decoded at
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Parallel workers for hub datasets
    #[arg(long, default_value_t = DEFAULT_NUM_PROC)]
    num_proc: usize,

    /// Output file
    #[arg(short, long, default_value = "prepared.jsonl")]
    output: PathBuf,

    /// Stop after this many items
    #[arg(long)]
    limit: Option<usize>,

    /// Draw download and decoding progress bars
    #[arg(long)]
    show_progress: bool,

    /// Hub download cache (default: the HF cache)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if !args.show_progress {
        progress::disable_progress_bars();
    }
    ensure!(args.num_proc > 0, "--num-proc must be at least 1");

    let mut config = DatasetConfig::from_file(&args.config)?;
    if let Some(split) = args.split {
        config.split = split;
    }

    let mut loader = match args.cache_dir {
        Some(dir) => DatasetLoader::with_source(
            config,
            args.sample_rate,
            HubSource::new().with_cache_dir(dir),
        ),
        None => DatasetLoader::new(config, args.sample_rate),
    };
    loader.load(args.num_proc)?;

    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0usize;
    for item in loader
        .prepared_items()?
        .take(args.limit.unwrap_or(usize::MAX))
    {
        serde_json::to_writer(&mut writer, &item?)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;

    log::info!("wrote {written} prepared items to {}", args.output.display());
    Ok(())
}
