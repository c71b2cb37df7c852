use anyhow::{bail, Context, Result};
use paper_trail::{
    load_batch, load_records_csv, GraphStore, InputBatch, Pipeline, PipelineConfig, ReviewStatus,
    Severity, SqliteGraphStore,
};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  paper-trail run <batch.json|records.csv> <graph.db> [config.json]
  paper-trail review list <graph.db>
  paper-trail review confirm|reject <graph.db> <left-id> <right-id> [reviewer]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["run", batch, db] => run(Path::new(batch), Path::new(db), None),
        ["run", batch, db, config] => run(Path::new(batch), Path::new(db), Some(Path::new(config))),
        ["review", "list", db] => review_list(Path::new(db)),
        ["review", verdict, db, left, right, rest @ ..] if rest.len() <= 1 => {
            let status = match *verdict {
                "confirm" => ReviewStatus::Confirmed,
                "reject" => ReviewStatus::Rejected,
                other => bail!("unknown review verdict `{}`\n{}", other, USAGE),
            };
            let reviewer = rest.first().copied().unwrap_or("cli");
            review_adjudicate(Path::new(db), left, right, status, reviewer)
        }
        _ => bail!("{}", USAGE),
    }
}

fn run(batch_path: &Path, db_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    // A bare CSV carries records only
    let batch = if batch_path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
        InputBatch {
            records: load_records_csv(batch_path)?,
            ..Default::default()
        }
    } else {
        load_batch(batch_path)?
    };

    let mut store = SqliteGraphStore::open(db_path)
        .with_context(|| format!("Failed to open graph store: {:?}", db_path))?;

    let pipeline = Pipeline::new(config)?;
    let output = pipeline.run_and_commit(&batch, &mut store)?;
    let report = &output.report;

    println!("📥 {}", report.data_quality.summary());
    println!("🔍 {}", report.summary());
    for failure in &report.detector_failures {
        println!("   ⚠️  {}", failure);
    }

    println!("\n🚩 Highest risk:");
    for risk in report.risk.iter().take(10) {
        let name = output
            .graph
            .entity(&risk.entity_id)
            .map(|e| e.display_name.as_str())
            .unwrap_or(&risk.entity_id);
        println!(
            "   {:.2}  {}  ({} critical, {} high)",
            risk.risk_score,
            name,
            risk.count(Severity::Critical),
            risk.count(Severity::High)
        );
    }

    if let Some(commit) = &report.commit {
        println!(
            "\n💾 Committed {} entities, {} edges, {} flags; {} new review pairs",
            commit.entities, commit.edges, commit.flags, commit.queued_reviews
        );
    }

    Ok(())
}

fn review_list(db_path: &Path) -> Result<()> {
    let store = SqliteGraphStore::open(db_path)?;
    let pending = store.pending_reviews()?;

    if pending.is_empty() {
        println!("✓ Review queue is empty");
        return Ok(());
    }

    println!("👀 {} pairs awaiting review:", pending.len());
    for item in &pending {
        println!(
            "   {:.3}  [{}] {} | {}\n          {}  {}",
            item.score, item.kind, item.left_name, item.right_name, item.left, item.right
        );
    }
    Ok(())
}

fn review_adjudicate(db_path: &Path, left: &str, right: &str, status: ReviewStatus, reviewer: &str) -> Result<()> {
    let mut store = SqliteGraphStore::open(db_path)?;
    store.adjudicate(left, right, status, reviewer)?;
    println!("✓ {} | {} marked {}", left, right, status);
    Ok(())
}
