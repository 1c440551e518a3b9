//! Checkpoint coverage overview for `nhv status`.
//!
//! Summarizes what has been collected so far: per-stage checkpoint counts,
//! total results, and recorded target failures. Gives confidence that a
//! long run is making durable progress and shows what a restart would skip.

use sqlx::SqlitePool;

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::models::Stage;

struct StageStats {
    items: i64,
    results: usize,
    failed_targets: i64,
}

/// Run the status command: query the checkpoint database and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(&config.checkpoint.path).await?;

    let db_size = std::fs::metadata(&config.checkpoint.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("news-harvest checkpoint status");
    println!("  database: {}", config.checkpoint.path.display());
    println!("  size:     {}", format_bytes(db_size));
    println!();
    println!("{:<10} {:>8} {:>10} {:>16}", "STAGE", "ITEMS", "RESULTS", "FAILED TARGETS");

    for stage in [Stage::Links, Stage::Content] {
        let stats = stage_stats(&pool, stage).await?;
        println!(
            "{:<10} {:>8} {:>10} {:>16}",
            stage.label(),
            stats.items,
            stats.results,
            stats.failed_targets
        );
    }

    pool.close().await;
    Ok(())
}

async fn stage_stats(pool: &SqlitePool, stage: Stage) -> Result<StageStats> {
    let store = CheckpointStore::new(pool.clone(), stage);
    store.initialize().await?;

    let items = store.count().await?;
    let results = store.load_all().await?.values().map(Vec::len).sum();

    let failed_targets: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM fetch_failures WHERE stage = ?")
            .bind(stage.label())
            .fetch_one(pool)
            .await?;

    Ok(StageStats {
        items,
        results,
        failed_targets,
    })
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
