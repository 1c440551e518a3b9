//! Core data types that flow through the fetch pipeline.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The two collection stages. Each stage has its own catalog, checkpoint
/// table, and output artifact; both run the same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Entity name → candidate article URLs (news search).
    Links,
    /// Article URL → extracted text.
    Content,
}

impl Stage {
    /// Checkpoint table for this stage. One table per stage so a crash in
    /// one stage never touches the other's records.
    pub fn table(&self) -> &'static str {
        match self {
            Stage::Links => "links_checkpoints",
            Stage::Content => "content_checkpoints",
        }
    }

    /// Label used in logs, progress output, and the failures table.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Links => "links",
            Stage::Content => "content",
        }
    }

    /// Stem of the output artifact written by the finalizer.
    pub fn output_stem(&self) -> &'static str {
        match self {
            Stage::Links => "player_links",
            Stage::Content => "player_articles",
        }
    }
}

/// One unit of the catalog: a unique key plus the ordered targets to fetch
/// for it. Built once by the catalog loader, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: String,
    pub targets: Vec<String>,
}

/// The completed result for one work item. Only produced after every target
/// of the item has been attempted; never represents partial progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub key: String,
    pub results: Vec<String>,
}

/// A target whose fetch failed and was dropped from the item's results.
/// Recorded durably next to the checkpoint so the loss is observable.
#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// The full `key → results` map. Seeded from the checkpoint store at run
/// start, extended during the run, and written once by the finalizer. Keyed
/// and ordered by item key; reconstructable from the store alone.
pub type Aggregate = BTreeMap<String, Vec<String>>;

/// One row of the entity catalog file (JSONL, one object per line).
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntity {
    pub name: String,
    /// Ranking value; the loader keeps the top N by this, descending.
    #[serde(default)]
    pub value: f64,
}
