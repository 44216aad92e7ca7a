//! Data layer: record types, dataset sources, audio casting and item preparation.
//!
//! Architecture:
//! ```text
//!  hub repo / local dir
//!        │
//!        ▼
//!   ┌──────────┐
//!   │   hub    │  resolve split files → reader → AudioDataset
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  audio   │  decode + resample the audio column
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader  │  DatasetLoader: load(), dataset(), prepare_item()
//!   └──────────┘
//! ```

pub mod audio;
pub mod error;
pub mod hub;
pub mod loader;
pub mod model;
pub mod reader;
pub mod source;
