mod collaborators;
mod logging;

use std::process::ExitCode;

use irisdb_core::{
    DistanceMetric, IndexConfig, IndexPersistence, LoadOutcome, RecordStore, Reconciler, Result,
};

use collaborators::{FileFeatureExtractor, FileRecordStore};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging();

    let args: Vec<String> = std::env::args().collect();
    let result = match (args.get(1).map(String::as_str), args.get(2), args.get(3)) {
        (Some("diagnose"), Some(records_path), None) => diagnose(records_path).await,
        (Some("rebuild"), Some(records_path), Some(features_path)) => {
            rebuild(records_path, features_path).await
        }
        _ => {
            usage();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn usage() {
    eprintln!("IrisDB index maintenance tools");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  irisdb-tools diagnose <records.json>");
    eprintln!("  irisdb-tools rebuild <records.json> <features.json>");
    eprintln!();
    eprintln!("The data directory, feature dimension and metric come from");
    eprintln!("IRISDB_DATA_DIR, IRISDB_FEATURE_DIM and IRISDB_METRIC.");
}

/// Report index, mapping and record-store statistics plus any divergence,
/// without mutating anything.
async fn diagnose(records_path: &str) -> Result<()> {
    let config = IndexConfig::from_env();
    println!("=== IrisDB Index Diagnosis ===\n");

    let store = FileRecordStore::load(records_path)?;
    let records = store.list_active_records().await?;
    let with_cached = records
        .iter()
        .filter(|r| r.cached_internal_id.is_some())
        .count();
    println!("Record store:");
    println!("  Active records: {}", records.len());
    println!("  Records with a cached index position: {}", with_cached);

    let persistence = IndexPersistence::new(&config.data_dir)?;
    match persistence.load()? {
        LoadOutcome::NotFound => {
            println!("\nPersisted index: not found (first run, or deleted)");
        }
        LoadOutcome::Corrupt(reason) => {
            println!("\nPersisted index: CORRUPT");
            println!("  Reason: {}", reason);
            println!("  Run `irisdb-tools rebuild` to restore it from the record store.");
        }
        LoadOutcome::Loaded(index, map) => {
            println!("\nPersisted index:");
            println!("  Vectors: {}", index.count());
            println!("  Dimension: {}", index.dim());
            println!("  Metric: {}", index.metric());
            println!("  Next internal id: {}", map.next_id());

            let report = Reconciler::audit_consistency(&map, &records);
            println!("\nConsistency:");
            if report.is_aligned() {
                println!("  Mapping and record store agree");
            } else {
                if !report.never_indexed.is_empty() {
                    println!(
                        "  Active records never indexed ({}): {:?}",
                        report.never_indexed.len(),
                        report.never_indexed
                    );
                }
                if !report.unknown_to_records.is_empty() {
                    println!(
                        "  Indexed but unknown to the record store ({}, expected under soft-delete): {:?}",
                        report.unknown_to_records.len(),
                        report.unknown_to_records
                    );
                }
            }
        }
    }

    Ok(())
}

/// Rebuild the index and mapping from the record store, reusing vectors
/// from the previous index where the cached bindings still hold, then
/// write the updated cached positions back to the records file.
async fn rebuild(records_path: &str, features_path: &str) -> Result<()> {
    let config = IndexConfig::from_env();

    let store = FileRecordStore::load(records_path)?;
    let normalize = config.metric == DistanceMetric::InnerProduct;
    let extractor = FileFeatureExtractor::load(features_path, normalize)?;
    let persistence = IndexPersistence::new(&config.data_dir)?;

    let previous = match persistence.load()? {
        LoadOutcome::Loaded(index, map) => Some((index, map)),
        LoadOutcome::NotFound => None,
        LoadOutcome::Corrupt(reason) => {
            tracing::warn!(%reason, "discarding corrupt persisted state");
            None
        }
    };

    let records = store.list_active_records().await?;
    println!("Rebuilding index from {} active records...", records.len());

    let reconciler = Reconciler::new(config.dim, config.metric);
    let (index, map, summary) = reconciler
        .rebuild_from_records(
            &records,
            &extractor,
            previous.as_ref().map(|(index, map)| (index, map)),
        )
        .await?;

    persistence.save(&index, &map)?;

    for (internal, external) in map.entries() {
        store.mark_indexed(external, internal).await?;
    }
    store.persist()?;

    println!("Rebuild complete:");
    println!("  Indexed: {}", summary.indexed);
    println!("  Reused vectors: {}", summary.reused);
    println!("  Skipped: {}", summary.skipped);
    println!("  Index saved to {}", config.data_dir.display());

    Ok(())
}
