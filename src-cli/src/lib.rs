//! Headless driver for one pipeline session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;

use plancraft_core::pipeline::SessionSummary;
use plancraft_core::{
    CameraView, Config, DownloadItem, Settings, SourceFile, Stage, Studio, StyleKey, StyleParams,
    ViewSelection,
};

/// Concurrent image downloads
const DOWNLOAD_CONCURRENCY: usize = 4;

pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Arguments of `plancraft run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub file: PathBuf,
    pub views: Vec<String>,
    pub style: String,
    pub prompt: Option<String>,
    pub strength: f32,
    pub out: PathBuf,
    pub refine: Option<String>,
    pub api: Option<String>,
}

/// Arguments of `plancraft config`
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub api: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_poll_failures: Option<u32>,
    pub refinement: Option<bool>,
}

/// Run one file through the whole pipeline
pub fn run(options: RunOptions) -> anyhow::Result<()> {
    init_logging(&["plancraft=info", "plancraft_lib=info", "plancraft_core=info"]);

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(do_run(options))
}

async fn do_run(options: RunOptions) -> anyhow::Result<()> {
    let views = parse_views(&options.views)?;
    let style = StyleParams::new(
        StyleKey::from_key(&options.style)
            .ok_or_else(|| anyhow!("Unknown style '{}'", options.style))?,
        options.prompt.clone().unwrap_or_default(),
        options.strength,
    );
    style.validate()?;

    let mut config = Config::load_or_default();
    if let Some(api) = options.api {
        config.api_base_url = api;
    }
    let base_url = config.api_base_url.clone();

    let bytes = tokio::fs::read(&options.file)
        .await
        .with_context(|| format!("Failed to read {:?}", options.file))?;
    let name = options
        .file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("Not a file: {:?}", options.file))?;

    let (studio, mut changes) = Studio::connect(config)?;
    tracing::info!(file = %name, bytes = bytes.len(), "Uploading");
    studio.upload(SourceFile::new(name, bytes)).await?;

    if studio.stage().await == Stage::AwaitingSyncResult {
        // Raster uploads wait for an explicit whitebox request
        tracing::info!("Requesting whitebox");
        studio.retry_processing().await?;
    }
    wait_for_whitebox(&studio, &mut changes).await?;

    let batch = studio.render(&views, &style).await?;
    tracing::info!(images = batch.len(), "Gallery ready");

    if let Some(instruction) = options.refine {
        studio.refine(&instruction).await?;
        if let Some(notice) = studio.notice() {
            tracing::info!("{}", notice.message);
        }
    }

    let session = studio.snapshot().await;
    let downloads: Vec<DownloadItem> = session
        .assets
        .render_batch()
        .map(|batch| {
            batch
                .iter()
                .enumerate()
                .map(|(i, item)| DownloadItem::new(i, item.image_ref.clone()))
                .collect()
        })
        .unwrap_or_default();

    let written = download_all(&base_url, &downloads, &options.out).await?;
    for (item, path) in session
        .assets
        .render_batch()
        .into_iter()
        .flatten()
        .zip(&written)
    {
        println!("{}\t{}", item.view.label(), path.display());
    }

    studio.shutdown();
    Ok(())
}

/// Block until the session has a whitebox, or fail with the session error.
async fn wait_for_whitebox(
    studio: &Studio,
    changes: &mut mpsc::Receiver<SessionSummary>,
) -> anyhow::Result<()> {
    loop {
        let session = studio.snapshot().await;
        match session.stage {
            Stage::WhiteboxReady => return Ok(()),
            Stage::Idle | Stage::AwaitingSyncResult => {
                let error = session.error.unwrap_or_else(|| "Processing stopped".to_string());
                bail!(error);
            }
            _ => {}
        }

        tokio::select! {
            summary = changes.recv() => match summary {
                Some(summary) => {
                    if let Some(note) = summary.progress_note {
                        tracing::info!(stage = %summary.stage, "{}", note);
                    }
                }
                None => bail!("Session closed"),
            },
            _ = tokio::signal::ctrl_c() => {
                studio.shutdown();
                bail!("Interrupted");
            }
        }
    }
}

fn parse_views(keys: &[String]) -> anyhow::Result<ViewSelection> {
    let views = keys
        .iter()
        .map(|key| {
            CameraView::from_key(key.trim()).ok_or_else(|| anyhow!("Unknown camera view '{}'", key))
        })
        .collect::<anyhow::Result<ViewSelection>>()?;
    if views.is_empty() {
        bail!("Select at least one camera view");
    }
    Ok(views)
}

/// Resolve an image reference against the backend base URL.
///
/// Relative references resolve under the base path; root-relative and
/// absolute references are kept as the backend sent them.
fn resolve_image_url(base_url: &str, image_ref: &str) -> anyhow::Result<reqwest::Url> {
    let mut base = reqwest::Url::parse(base_url)
        .with_context(|| format!("Invalid API base URL '{}'", base_url))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(image_ref)
        .with_context(|| format!("Invalid image reference '{}'", image_ref))
}

async fn download_all(
    base_url: &str,
    items: &[DownloadItem],
    out_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", out_dir))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    futures::stream::iter(items.iter().cloned())
        .map(|item| {
            let client = client.clone();
            async move {
                let url = resolve_image_url(base_url, &item.image_ref)?;
                let bytes = client
                    .get(url.clone())
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                let path = out_dir.join(&item.file_name);
                write_image(&path, &bytes).await?;
                tracing::debug!(%url, path = %path.display(), "Downloaded");
                Ok::<_, anyhow::Error>(path)
            }
        })
        .buffered(DOWNLOAD_CONCURRENCY)
        .try_collect()
        .await
}

async fn write_image(path: &Path, bytes: &bytes::Bytes) -> anyhow::Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

/// Apply `update` to the persisted settings and print the result
pub fn configure(update: ConfigUpdate) -> anyhow::Result<()> {
    let path = Config::load_or_default().settings_file;
    let settings = apply_update(Settings::load(&path), update);
    settings
        .save(&path)
        .with_context(|| format!("Failed to save {:?}", path))?;

    println!("{}", serde_json::to_string_pretty(&settings)?);
    println!("Saved to {}", path.display());
    Ok(())
}

fn apply_update(mut settings: Settings, update: ConfigUpdate) -> Settings {
    if update.api.is_some() {
        settings.api_base_url = update.api;
    }
    if update.poll_interval_ms.is_some() {
        settings.poll_interval_ms = update.poll_interval_ms;
    }
    if update.max_poll_failures.is_some() {
        settings.max_consecutive_poll_failures = update.max_poll_failures;
    }
    if update.refinement.is_some() {
        settings.refinement_enabled = update.refinement;
    }
    settings
}
