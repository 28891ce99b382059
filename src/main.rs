use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use photosel::models::{GridEvent, ThumbnailGrid};
use photosel::{LoadOutcome, Pipeline, PipelineConfig, StartupSettings};

const UPGRADE_TIMEOUT: Duration = Duration::from_secs(300);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("photosel=info".parse()?),
        )
        .init();

    let folder = start_folder().context("No folder to browse")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run(folder))
}

/// First argument, then `PHOTOSEL_FOLDER`, then the usual start-up fallback.
fn start_folder() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("PHOTOSEL_FOLDER").map(PathBuf::from))
        .or_else(|| StartupSettings::default().resolve_start_folder())
}

async fn run(folder: PathBuf) -> Result<()> {
    let pipeline = Pipeline::new(PipelineConfig::from_env())?;
    let mut grid = ThumbnailGrid::new();

    let outcome = pipeline.load_folder_async(folder.clone()).await;
    let mut upgraded = 0;
    for event in pipeline.grid_events().try_iter() {
        if matches!(event, GridEvent::Upgraded { .. }) {
            upgraded += 1;
        }
        grid.apply(event);
    }

    match outcome {
        LoadOutcome::NoImages | LoadOutcome::Cancelled => {
            info!(?folder, ?outcome, "Nothing to preview");
            return Ok(());
        }
        LoadOutcome::Loaded { .. } | LoadOutcome::CacheHit { .. } => {}
    }

    let upgrades = tokio::task::block_in_place(|| pipeline.upgrades().wait_idle(UPGRADE_TIMEOUT));
    if !upgrades {
        warn!("Thumbnail upgrades still running");
    }
    upgraded += pipeline
        .grid_events()
        .try_iter()
        .filter(|event| matches!(event, GridEvent::Upgraded { .. }))
        .count();

    if let Some(first) = grid.entries().first() {
        let preview = pipeline
            .preview_async(Arc::clone(first))
            .await
            .with_context(|| format!("Failed to preview {:?}", first.path()))?;
        let (width, height) = preview.dimensions();
        info!(file = preview.file_name(), width, height, "Preview generated");
    }

    info!(
        ?folder,
        images = grid.len(),
        upgraded,
        decodes = pipeline.decode_count(),
        ?outcome,
        "Done"
    );
    Ok(())
}
