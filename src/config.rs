//! TOML configuration for news-harvest.
//!
//! Every component takes its settings from an explicit [`Config`] passed at
//! construction; there is no process-wide mutable state. All fields carry
//! defaults so a minimal config file only needs the catalog path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::export::OutputFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Outer retry parameters for the whole run.
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Total attempts the retry supervisor makes before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles after every failed attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckpointConfig {
    /// SQLite database holding the per-stage checkpoint tables.
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("data/checkpoint.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// JSONL entity file: one `{"name": ..., "value": ...}` object per line.
    pub path: PathBuf,
    /// Keep the top N entities by value, descending.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Query templates expanded per entity; `{name}` is replaced with the
    /// entity name. Order is preserved in the item's target list.
    #[serde(default = "default_variations")]
    pub variations: Vec<String>,
    /// News search RSS endpoint. Overridable so tests can point at a stub.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            variations: default_variations(),
            endpoint: default_search_endpoint(),
            lang: default_lang(),
            region: default_region(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_variations() -> Vec<String> {
    vec![
        "{name}".to_string(),
        "{name} Fantasy Football".to_string(),
        "{name} Dynasty Superflex".to_string(),
    ]
}
fn default_search_endpoint() -> String {
    "https://news.google.com/rss/search".to_string()
}
fn default_lang() -> String {
    "en-US".to_string()
}
fn default_region() -> String {
    "US".to_string()
}
fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Browser-like User-Agent; many news sites reject the reqwest default.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// One of `json`, `binary`, `columnar`.
    #[serde(default = "default_format")]
    pub format: String,
    /// Directory the per-stage output artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            dir: default_output_dir(),
        }
    }
}

fn default_format() -> String {
    "json".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    /// The validated output format. Config loading already rejects unknown
    /// formats, so after [`load_config`] this cannot fail.
    pub fn output_format(&self) -> Result<OutputFormat> {
        self.output.format.parse()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config =
        toml::from_str(&content).map_err(|e| Error::Config(format!("failed to parse: {}", e)))?;

    if config.run.max_retries == 0 {
        return Err(Error::Config("run.max_retries must be >= 1".into()));
    }
    if config.catalog.top_n == 0 {
        return Err(Error::Config("catalog.top_n must be >= 1".into()));
    }
    if config.search.variations.is_empty() {
        return Err(Error::Config(
            "search.variations must contain at least one template".into(),
        ));
    }

    // Reject an unknown output format before any work happens.
    config.output_format()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nhv.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let (_dir, path) = write_config("[catalog]\npath = \"players.jsonl\"\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.run.max_retries, 3);
        assert_eq!(cfg.run.base_delay_secs, 60);
        assert_eq!(cfg.catalog.top_n, 500);
        assert_eq!(cfg.search.variations.len(), 3);
        assert_eq!(cfg.output.format, "json");
    }

    #[test]
    fn unknown_output_format_rejected() {
        let (_dir, path) = write_config(
            "[catalog]\npath = \"players.jsonl\"\n[output]\nformat = \"parquet\"\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("parquet"));
    }

    #[test]
    fn zero_retries_rejected() {
        let (_dir, path) =
            write_config("[catalog]\npath = \"players.jsonl\"\n[run]\nmax_retries = 0\n");
        assert!(load_config(&path).is_err());
    }
}
