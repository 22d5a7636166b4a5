//! Text extraction work executed by admitted jobs.

mod chunking;
mod service;
pub mod types;

pub use service::{Extractor, TextExtractor};
pub use types::{
    ChunkRecord, ExtractionError, ExtractionMode, FileExtractor, FileSource, OnlineExtractor,
    OnlineSource, parse_date,
};
