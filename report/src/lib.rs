//! Report generation for benchmark results
//!
//! This crate writes a final sample collection as:
//!
//! - JSON (summary plus every sample)
//! - CSV (one row per sample, metadata as a JSON column)

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use redis_bench_core::Sample;
use serde_json::json;
use thiserror::Error;

/// Export error
#[derive(Error, Debug)]
pub enum ReportError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for exports
pub type ReportResult<T> = std::result::Result<T, ReportError>;

/// Pretty-printed JSON export
pub struct JsonExporter;

impl JsonExporter {
    /// Write `samples` with a per-metric summary to `path`
    pub fn export(samples: &[Sample], path: impl AsRef<Path>) -> ReportResult<()> {
        let mut per_metric: BTreeMap<&str, usize> = BTreeMap::new();
        for sample in samples {
            *per_metric.entry(sample.metric.as_str()).or_default() += 1;
        }

        let output = json!({
            "summary": {
                "total_samples": samples.len(),
                "samples_per_metric": per_metric,
            },
            "samples": samples,
        });

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &output)?;
        Ok(())
    }
}

/// Flat CSV export
pub struct CsvExporter;

impl CsvExporter {
    /// Column headers, in order
    pub const HEADERS: [&'static str; 6] =
        ["metric", "value", "unit", "sequence", "timestamp", "metadata"];

    /// Write one row per sample to `path`
    pub fn export(samples: &[Sample], path: impl AsRef<Path>) -> ReportResult<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(Self::HEADERS)?;

        for sample in samples {
            wtr.write_record([
                sample.metric.clone(),
                sample.value.to_string(),
                sample.unit.clone(),
                sample.sequence.map(|s| s.to_string()).unwrap_or_default(),
                sample.timestamp.to_rfc3339(),
                serde_json::to_string(&sample.metadata)?,
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }
}
