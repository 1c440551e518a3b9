//! The checkpointed fetch pipeline: item processor and run driver.
//!
//! Both stages run through [`run_stage`]: seed the aggregate from the
//! checkpoint store, walk the catalog in order, skip completed items,
//! process the rest through the fetch adapter, checkpoint each item the
//! moment it completes, and finally hand the aggregate to the output
//! finalizer. A restarted run re-does only un-checkpointed items.

use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::export;
use crate::fetch::FetchAdapter;
use crate::models::{ItemResult, Stage, TargetFailure, WorkItem};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Per-run options from the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageOptions {
    /// Reprocess items even if they are checkpointed.
    pub full: bool,
    /// Cap the number of catalog items handled this run.
    pub limit: Option<usize>,
}

/// Counters reported after a stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: u64,
    pub processed: u64,
    pub skipped: u64,
    /// Items that hit a non-target-level error and were left un-checkpointed.
    pub failed_items: u64,
    /// Targets dropped from otherwise-completed items.
    pub failed_targets: u64,
    /// Results newly collected this run (not counting seeded ones).
    pub results_collected: u64,
}

/// Outcome of processing one work item: the finished result plus any targets
/// that were dropped along the way.
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    pub result: ItemResult,
    pub failures: Vec<TargetFailure>,
}

/// Drive all of one item's targets through the adapter, best effort.
///
/// Per-target failures are logged and recorded but never abort the item; a
/// failed target simply contributes nothing. The result exists only once
/// every target has been attempted; there is no partial checkpoint, so a
/// crash mid-item re-fetches the whole item next run. The links stage
/// deduplicates results across targets (query variations overlap heavily),
/// preserving first-seen order.
pub async fn process_item(
    adapter: &dyn FetchAdapter,
    stage: Stage,
    item: &WorkItem,
) -> ProcessedItem {
    let mut results: Vec<String> = Vec::new();
    let mut failures = Vec::new();

    for target in &item.targets {
        match adapter.fetch(target).await {
            Ok(fetched) => results.extend(fetched),
            Err(e) => {
                warn!(
                    stage = stage.label(),
                    key = %item.key,
                    target = %target,
                    error = %e,
                    "target fetch failed, dropping"
                );
                failures.push(TargetFailure {
                    target: target.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if stage == Stage::Links {
        let mut seen = std::collections::HashSet::new();
        results.retain(|r| seen.insert(r.clone()));
    }

    ProcessedItem {
        result: ItemResult {
            key: item.key.clone(),
            results,
        },
        failures,
    }
}

/// Run one stage over its catalog and write the final artifact.
///
/// Storage failures abort the attempt (the retry supervisor decides what
/// happens next); any other per-item failure is logged and the driver moves
/// on, leaving that item un-checkpointed for a later pass.
pub async fn run_stage(
    config: &Config,
    stage: Stage,
    catalog: &[WorkItem],
    adapter: &dyn FetchAdapter,
    progress: &dyn ProgressReporter,
    options: StageOptions,
) -> Result<RunSummary> {
    let pool = db::connect(&config.checkpoint.path).await?;
    let store = CheckpointStore::new(pool.clone(), stage);
    store.initialize().await?;

    let mut aggregate = store.load_all().await?;

    let catalog = match options.limit {
        Some(limit) => &catalog[..limit.min(catalog.len())],
        None => catalog,
    };

    let mut summary = RunSummary {
        total: catalog.len() as u64,
        ..Default::default()
    };

    for (n, item) in catalog.iter().enumerate() {
        if !options.full && aggregate.contains_key(&item.key) {
            summary.skipped += 1;
        } else {
            match handle_item(&store, adapter, stage, item).await {
                Ok(processed) => {
                    summary.processed += 1;
                    summary.failed_targets += processed.failures.len() as u64;
                    summary.results_collected += processed.result.results.len() as u64;
                    aggregate.insert(processed.result.key, processed.result.results);
                }
                Err(e @ Error::Persistence(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        stage = stage.label(),
                        key = %item.key,
                        error = %e,
                        "item failed, left un-checkpointed"
                    );
                    summary.failed_items += 1;
                }
            }
        }

        progress.report(ProgressEvent {
            stage: stage.label(),
            n: (n + 1) as u64,
            total: summary.total,
            skipped: summary.skipped,
        });
    }

    let format = config.output_format()?;
    let output_path = export::default_output_path(config, stage, format);
    export::write_aggregate(&aggregate, format, &output_path)?;

    info!(
        stage = stage.label(),
        total = summary.total,
        processed = summary.processed,
        skipped = summary.skipped,
        failed_items = summary.failed_items,
        failed_targets = summary.failed_targets,
        "stage complete"
    );

    println!("sync {}", stage.label());
    println!("  items: {}", summary.total);
    println!("  processed: {}", summary.processed);
    println!("  skipped (checkpointed): {}", summary.skipped);
    println!("  failed items: {}", summary.failed_items);
    println!("  failed targets: {}", summary.failed_targets);
    println!("  results collected: {}", summary.results_collected);
    println!("  output: {}", output_path.display());
    println!("ok");

    pool.close().await;
    Ok(summary)
}

/// Process one item and commit it: checkpoint first, then the failure
/// records. The item is durable the instant `upsert` returns.
async fn handle_item(
    store: &CheckpointStore,
    adapter: &dyn FetchAdapter,
    stage: Stage,
    item: &WorkItem,
) -> Result<ProcessedItem> {
    let processed = process_item(adapter, stage, item).await;
    store
        .upsert(&processed.result.key, &processed.result.results)
        .await?;
    store
        .record_failures(&processed.result.key, &processed.failures)
        .await?;
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CatalogConfig, Config};
    use crate::error::FetchError;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Deterministic in-memory adapter: `fetch(t)` yields `result(t)` unless
    /// `t` is in the failure set; every call is recorded.
    struct MockAdapter {
        calls: Mutex<Vec<String>>,
        fail: HashSet<String>,
        duplicate_every_result: bool,
    }

    impl MockAdapter {
        fn new(fail: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: fail.iter().map(|s| s.to_string()).collect(),
                duplicate_every_result: false,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FetchAdapter for MockAdapter {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch(&self, target: &str) -> std::result::Result<Vec<String>, FetchError> {
            self.calls.lock().unwrap().push(target.to_string());
            if self.fail.contains(target) {
                return Err(FetchError::Malformed("mock failure".to_string()));
            }
            let result = format!("result({})", target);
            if self.duplicate_every_result {
                Ok(vec![result.clone(), result])
            } else {
                Ok(vec![result])
            }
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            run: Default::default(),
            checkpoint: crate::config::CheckpointConfig {
                path: dir.path().join("checkpoint.db"),
            },
            catalog: CatalogConfig {
                path: dir.path().join("players.jsonl"),
                top_n: 500,
            },
            search: Default::default(),
            fetch: Default::default(),
            output: crate::config::OutputConfig {
                format: "json".to_string(),
                dir: dir.path().join("out"),
            },
        }
    }

    fn catalog(spec: &[(&str, &[&str])]) -> Vec<WorkItem> {
        spec.iter()
            .map(|(key, targets)| WorkItem {
                key: key.to_string(),
                targets: targets.iter().map(|t| t.to_string()).collect(),
            })
            .collect()
    }

    async fn load_store(config: &Config, stage: Stage) -> crate::models::Aggregate {
        let pool = db::connect(&config.checkpoint.path).await.unwrap();
        let store = CheckpointStore::new(pool, stage);
        store.initialize().await.unwrap();
        store.load_all().await.unwrap()
    }

    #[tokio::test]
    async fn failed_target_is_dropped_but_item_completes() {
        // {A: [t1, t2], B: [t3]}, t2 fails.
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let items = catalog(&[("A", &["t1", "t2"]), ("B", &["t3"])]);
        let adapter = MockAdapter::new(&["t2"]);

        let summary = run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed_targets, 1);
        assert_eq!(summary.failed_items, 0);

        let aggregate = load_store(&config, Stage::Links).await;
        assert_eq!(aggregate["A"], vec!["result(t1)"]);
        assert_eq!(aggregate["B"], vec!["result(t3)"]);

        // The dropped target is durably recorded.
        let pool = db::connect(&config.checkpoint.path).await.unwrap();
        let (key, target): (String, String) =
            sqlx::query_as("SELECT key, target FROM fetch_failures WHERE stage = 'links'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!((key.as_str(), target.as_str()), ("A", "t2"));
    }

    #[tokio::test]
    async fn second_run_is_idempotent_and_fetches_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let items = catalog(&[("A", &["t1"]), ("B", &["t2"])]);

        let adapter = MockAdapter::new(&[]);
        run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();
        let first = load_store(&config, Stage::Links).await;

        let adapter2 = MockAdapter::new(&[]);
        let summary = run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter2,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        assert!(adapter2.calls().is_empty());
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.processed, 0);
        assert_eq!(load_store(&config, Stage::Links).await, first);
    }

    #[tokio::test]
    async fn checkpointed_item_is_never_fetched() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        // Simulate a previous invocation that completed A then crashed.
        {
            let pool = db::connect(&config.checkpoint.path).await.unwrap();
            let store = CheckpointStore::new(pool, Stage::Links);
            store.initialize().await.unwrap();
            store
                .upsert("A", &["earlier result".to_string()])
                .await
                .unwrap();
        }

        let items = catalog(&[("A", &["t1", "t2"]), ("B", &["t3"])]);
        let adapter = MockAdapter::new(&[]);
        run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        // None of A's targets were attempted; its prior result survives.
        assert_eq!(adapter.calls(), vec!["t3"]);
        let aggregate = load_store(&config, Stage::Links).await;
        assert_eq!(aggregate["A"], vec!["earlier result"]);
        assert_eq!(aggregate["B"], vec!["result(t3)"]);
    }

    #[tokio::test]
    async fn uncommitted_item_is_refetched_in_full() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let items = catalog(&[("A", &["t1", "t2"])]);

        // First "run" crashed mid-item: nothing was checkpointed for A, so a
        // fresh run attempts all of A's targets again.
        let adapter = MockAdapter::new(&[]);
        run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(adapter.calls(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn full_run_reprocesses_checkpointed_items() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let items = catalog(&[("A", &["t1"])]);

        let adapter = MockAdapter::new(&[]);
        run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        let adapter2 = MockAdapter::new(&[]);
        let summary = run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter2,
            &NoProgress,
            StageOptions {
                full: true,
                limit: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(adapter2.calls(), vec!["t1"]);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn limit_caps_the_catalog() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let items = catalog(&[("A", &["t1"]), ("B", &["t2"]), ("C", &["t3"])]);

        let adapter = MockAdapter::new(&[]);
        let summary = run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions {
                full: false,
                limit: Some(2),
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(adapter.calls(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn links_stage_dedups_across_targets() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        let mut adapter = MockAdapter::new(&[]);
        adapter.duplicate_every_result = true;
        let items = catalog(&[("A", &["t1"])]);

        run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        let aggregate = load_store(&config, Stage::Links).await;
        assert_eq!(aggregate["A"], vec!["result(t1)"]);
    }

    #[tokio::test]
    async fn content_stage_keeps_duplicate_results() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);

        let mut adapter = MockAdapter::new(&[]);
        adapter.duplicate_every_result = true;
        let items = catalog(&[("A", &["u1"])]);

        run_stage(
            &config,
            Stage::Content,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        let aggregate = load_store(&config, Stage::Content).await;
        assert_eq!(aggregate["A"].len(), 2);
    }

    #[tokio::test]
    async fn all_targets_failing_still_checkpoints_the_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let items = catalog(&[("A", &["t1", "t2"])]);
        let adapter = MockAdapter::new(&["t1", "t2"]);

        let summary = run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed_targets, 2);

        // Zero yield, but the item is done and will be skipped next run.
        let aggregate = load_store(&config, Stage::Links).await;
        assert_eq!(aggregate["A"], Vec::<String>::new());
    }

    #[tokio::test]
    async fn output_artifact_matches_the_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        let items = catalog(&[("A", &["t1"])]);
        let adapter = MockAdapter::new(&[]);

        run_stage(
            &config,
            Stage::Links,
            &items,
            &adapter,
            &NoProgress,
            StageOptions::default(),
        )
        .await
        .unwrap();

        let path = dir.path().join("out/player_links.json");
        let written: crate::models::Aggregate =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, load_store(&config, Stage::Links).await);
    }
}
