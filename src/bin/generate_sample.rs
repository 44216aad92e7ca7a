use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BinaryArray, Float64Array, StringArray, StructArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hound::{SampleFormat, WavSpec, WavWriter};
use parquet::arrow::ArrowWriter;

const SAMPLE_RATE: u32 = 16_000;
const OUTPUT_DIR: &str = "sample_dataset";

/// Deterministic splitmix64 stream for clip lengths, pitches and noise.
struct ClipRng(u64);

impl ClipRng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[lo, hi)`.
    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        lo + unit * (hi - lo)
    }
}

/// A noisy sine tone encoded as a 16-bit mono WAV file.
fn tone_wav(freq: f64, seconds: f64, rng: &mut ClipRng) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let n = (seconds * SAMPLE_RATE as f64) as usize;

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut buffer, spec).expect("Failed to create WAV writer");
    for i in 0..n {
        let t = i as f64 / SAMPLE_RATE as f64;
        let noise = rng.uniform(-0.01, 0.01);
        let v = 0.4 * (2.0 * std::f64::consts::PI * freq * t).sin() + noise;
        writer
            .write_sample((v * i16::MAX as f64) as i16)
            .expect("Failed to write sample");
    }
    writer.finalize().expect("Failed to finalize WAV");
    buffer.into_inner()
}

fn write_split(dir: &Path, split: &str, rows: usize, rng: &mut ClipRng) {
    let speakers = ["S1", "S2", "S3"];
    let words = ["hello", "world", "tone", "sample", "speech", "dataset"];

    let mut texts = Vec::with_capacity(rows);
    let mut speaker_col = Vec::with_capacity(rows);
    let mut durations = Vec::with_capacity(rows);
    let mut wavs = Vec::with_capacity(rows);
    let mut paths = Vec::with_capacity(rows);

    for i in 0..rows {
        let seconds = rng.uniform(0.5, 1.5);
        let freq = rng.uniform(200.0, 800.0);
        let text = format!("{} {}", words[i % words.len()], words[(i * 7 + 3) % words.len()]);

        texts.push(text);
        speaker_col.push(speakers[i % speakers.len()]);
        durations.push(seconds);
        wavs.push(tone_wav(freq, seconds, rng));
        paths.push(format!("{split}_{i:04}.wav"));
    }

    let audio = StructArray::from(vec![
        (
            Arc::new(Field::new("bytes", DataType::Binary, true)),
            Arc::new(BinaryArray::from(
                wavs.iter().map(|w| w.as_slice()).collect::<Vec<_>>(),
            )) as ArrayRef,
        ),
        (
            Arc::new(Field::new("path", DataType::Utf8, true)),
            Arc::new(StringArray::from(
                paths.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )) as ArrayRef,
        ),
    ]);

    let schema = Arc::new(Schema::new(vec![
        Field::new("audio", audio.data_type().clone(), false),
        Field::new("text", DataType::Utf8, false),
        Field::new("speaker", DataType::Utf8, false),
        Field::new("duration", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(audio),
            Arc::new(StringArray::from(
                texts.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(speaker_col)),
            Arc::new(Float64Array::from(durations)),
        ],
    )
    .expect("Failed to create RecordBatch");

    let output_path = dir.join(format!("{split}-00000-of-00001.parquet"));
    let file = std::fs::File::create(&output_path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");

    println!("Wrote {rows} clips to {}", output_path.display());
}

fn main() {
    let mut rng = ClipRng(42);

    let data_dir = Path::new(OUTPUT_DIR).join("data");
    std::fs::create_dir_all(&data_dir).expect("Failed to create output directory");

    write_split(&data_dir, "train", 24, &mut rng);
    write_split(&data_dir, "test", 6, &mut rng);

    let config = serde_json::json!({
        "name": OUTPUT_DIR,
        "split": "train",
        "audio_column_name": "audio",
        "text_column_name": "text",
        "speaker_column_name": "speaker",
        "constant_columns": { "lang": "en", "source": "synthetic" },
    });
    let config_path = format!("{OUTPUT_DIR}.json");
    let text = serde_json::to_string_pretty(&config).expect("Failed to serialize config");
    std::fs::write(&config_path, text).expect("Failed to write config");

    println!("Wrote dataset config to {config_path}");
}
