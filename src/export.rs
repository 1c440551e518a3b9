//! Output finalizer: write the full aggregate to its terminal artifact.
//!
//! The aggregate is always rebuilt from the checkpoint store, so `nhv export`
//! can regenerate the artifact at any time without refetching anything; a
//! crash between the last checkpoint write and the final output loses no
//! data. Output is written in full; the aggregate is bounded by the catalog.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::models::{Aggregate, Stage};

/// The recognized output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable pretty-printed JSON tree.
    Json,
    /// Compact bincode encoding.
    Binary,
    /// Tabular CSV, one row per (key, index, result). Keys whose result list
    /// is empty do not appear in this format.
    Columnar,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "binary" => Ok(OutputFormat::Binary),
            "columnar" => Ok(OutputFormat::Columnar),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Binary => "bin",
            OutputFormat::Columnar => "csv",
        }
    }
}

/// Default artifact path for a stage: `<output.dir>/<stem>.<ext>`.
pub fn default_output_path(config: &Config, stage: Stage, format: OutputFormat) -> PathBuf {
    config
        .output
        .dir
        .join(format!("{}.{}", stage.output_stem(), format.extension()))
}

/// Serialize the aggregate in the given format.
pub fn encode_aggregate(aggregate: &Aggregate, format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Json => serde_json::to_vec_pretty(aggregate)
            .map_err(|e| Error::Encode(format!("json output: {}", e))),
        OutputFormat::Binary => {
            bincode::serde::encode_to_vec(aggregate, bincode::config::standard())
                .map_err(|e| Error::Encode(format!("binary output: {}", e)))
        }
        OutputFormat::Columnar => Ok(encode_csv(aggregate).into_bytes()),
    }
}

/// Write the aggregate to `path` in the given format.
pub fn write_aggregate(aggregate: &Aggregate, format: OutputFormat, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let bytes = encode_aggregate(aggregate, format)?;
    std::fs::write(path, bytes).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Rebuild a stage's aggregate from the checkpoint store alone and write it.
/// Used both as the tail of a sync run and as the standalone `export`
/// command.
pub async fn run_export(
    config: &Config,
    stage: Stage,
    format_override: Option<OutputFormat>,
    output_override: Option<&Path>,
) -> Result<()> {
    let format = match format_override {
        Some(f) => f,
        None => config.output_format()?,
    };
    let default_path = default_output_path(config, stage, format);
    let path = output_override.unwrap_or(&default_path);

    let pool = db::connect(&config.checkpoint.path).await?;
    let store = CheckpointStore::new(pool.clone(), stage);
    store.initialize().await?;
    let aggregate = store.load_all().await?;

    let result_count: usize = aggregate.values().map(Vec::len).sum();
    write_aggregate(&aggregate, format, path)?;

    println!(
        "exported {}: {} keys, {} results -> {}",
        stage.label(),
        aggregate.len(),
        result_count,
        path.display()
    );

    pool.close().await;
    Ok(())
}

fn encode_csv(aggregate: &Aggregate) -> String {
    let mut out = String::from("key,index,result\n");
    for (key, results) in aggregate {
        for (index, result) in results.iter().enumerate() {
            out.push_str(&csv_field(key));
            out.push(',');
            out.push_str(&index.to_string());
            out.push(',');
            out.push_str(&csv_field(result));
            out.push('\n');
        }
    }
    out
}

/// RFC 4180 quoting: fields containing the separator, quotes, or line breaks
/// are wrapped in double quotes with inner quotes doubled.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
