//! Capture files in, analysis results out.

pub mod capture;
pub mod export;

pub use capture::{CaptureError, CaptureFormat, CaptureReader, CaptureWriter};
pub use export::{export_laps_csv, export_ndjson, export_points_csv, import_ndjson};
