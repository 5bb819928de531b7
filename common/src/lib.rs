// Access-file generation for the archive's digital masters: rights
// filtering, conversion, watermarking, upload and SAM csv exchange

pub mod backup;
pub mod bootstrap;
pub mod config;
pub mod converter;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod rights;
pub mod sam_csv;
pub mod storage;
pub mod telemetry;
pub mod watermark;
