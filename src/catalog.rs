//! Work catalog loaders.
//!
//! The links stage reads the ranked entity file and expands each entity into
//! search-query targets; the content stage's catalog is the links stage's
//! aggregate, with each entity's collected URLs as targets. Both produce an
//! ordered list of [`WorkItem`]s with unique keys, fixed before the run
//! starts. Loading has no side effects beyond reading.

use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Aggregate, CatalogEntity, WorkItem};

/// Load the entity catalog and build the links-stage work items: top N
/// entities by value, each expanded into one query per configured variation.
pub fn load_links_catalog(config: &Config) -> Result<Vec<WorkItem>> {
    let mut entities = read_entities(&config.catalog.path)?;

    entities.sort_by(|a, b| b.value.total_cmp(&a.value));
    entities.truncate(config.catalog.top_n);

    let items = entities
        .into_iter()
        .map(|entity| {
            let targets = config
                .search
                .variations
                .iter()
                .map(|template| template.replace("{name}", &entity.name))
                .collect();
            WorkItem {
                key: entity.name,
                targets,
            }
        })
        .collect();

    validate_items(items)
}

/// Build the content-stage catalog from the links aggregate. Entities that
/// yielded no links are skipped: there is nothing to fetch for them.
pub fn content_catalog_from(links: &Aggregate) -> Vec<WorkItem> {
    links
        .iter()
        .filter(|(_, urls)| !urls.is_empty())
        .map(|(key, urls)| WorkItem {
            key: key.clone(),
            targets: urls.clone(),
        })
        .collect()
}

fn read_entities(path: &Path) -> Result<Vec<CatalogEntity>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Catalog(format!("failed to read {}: {}", path.display(), e)))?;

    let mut entities = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entity: CatalogEntity = serde_json::from_str(line).map_err(|e| {
            Error::Catalog(format!(
                "{}:{}: malformed entity: {}",
                path.display(),
                lineno + 1,
                e
            ))
        })?;
        entities.push(entity);
    }
    Ok(entities)
}

/// Enforce the catalog contract: non-empty keys, non-empty target lists, and
/// unique keys. Duplicate keys with identical target lists are deduplicated
/// (first occurrence wins its position); duplicates with differing targets
/// are a hard error, since silently keeping either copy would lose targets.
fn validate_items(items: Vec<WorkItem>) -> Result<Vec<WorkItem>> {
    let mut seen: HashMap<String, Vec<String>> = HashMap::new();
    let mut out = Vec::with_capacity(items.len());

    for item in items {
        if item.key.trim().is_empty() {
            return Err(Error::Catalog("entity with empty name".into()));
        }
        if item.targets.is_empty() {
            return Err(Error::Catalog(format!("'{}' has no targets", item.key)));
        }
        match seen.get(&item.key) {
            None => {
                seen.insert(item.key.clone(), item.targets.clone());
                out.push(item);
            }
            Some(existing) if *existing == item.targets => {}
            Some(_) => {
                return Err(Error::Catalog(format!(
                    "duplicate key '{}' with differing targets",
                    item.key
                )));
            }
        }
    }
    Ok(out)
}
