use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use carowners_clean::{run_pipeline, ChunkConfig, PipelineConfig};

const SOURCE_PATH: &str = "data/car_owners.csv";
const OUTPUT_DIR: &str = "output";
/// In-memory bytes allowed per batch.
const BATCH_BUDGET_BYTES: u64 = 100 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PipelineConfig::new(SOURCE_PATH, OUTPUT_DIR)
        .chunk(ChunkConfig::default().budget_bytes(BATCH_BUDGET_BYTES));

    let start = Instant::now();
    let summary = match run_pipeline(config).await {
        Ok(summary) => summary,
        Err(err) => {
            if let Some(hint) = err.hint() {
                eprintln!("hint: {}", hint);
            }
            return Err(err).with_context(|| format!("cleaning {} failed", SOURCE_PATH));
        }
    };

    println!(
        "CLEAN OK invalid_emails={} duplicates={} cleaned_rows={} batches={} out={} elapsed={:.2}s",
        summary.invalid_emails,
        summary.duplicates,
        summary.cleaned_rows,
        summary.batches,
        summary.cleaned_path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
