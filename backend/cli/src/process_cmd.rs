//! `visiongrab process <image>`: one job, result on stdout.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine as _;
use tracing::{info, warn};
use visiongrab_core::{BackendKind, ProcessingJob, ProcessingResult, ResultSink};
use visiongrab_providers::resolve_kind;

use crate::app::App;
use crate::terminal_output::{dim, note_error};

pub async fn run(
    app: &App,
    image: &Path,
    backend: Option<BackendKind>,
    prompt: Option<String>,
) -> Result<()> {
    match process_image(app, image, backend, prompt).await {
        Ok(result) => {
            eprintln!("{}", dim(&format!("[{}]", result.label)));
            println!("{}", result.text);
            Ok(())
        }
        Err(e) => {
            note_error(&format!("{e:#}"));
            Err(e)
        }
    }
}

/// Run the job and record the result in history.
///
/// A local engine started for this job is stopped again afterwards.
pub async fn process_image(
    app: &App,
    image: &Path,
    backend: Option<BackendKind>,
    prompt: Option<String>,
) -> Result<ProcessingResult> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

    let (kind, startup_timeout) = {
        let settings = app.settings.read().await;
        (
            resolve_kind(backend, &settings.default_backend),
            Duration::from_secs(settings.local_engine.startup_timeout_secs),
        )
    };

    let engine = app.registry.engine();
    let started_here = kind == BackendKind::Local && !engine.is_running().await;
    if kind == BackendKind::Local {
        engine.start().await?;
        info!(timeout = ?startup_timeout, "Waiting for local engine");
        if let Err(e) = engine.wait_until_ready(startup_timeout).await {
            if started_here {
                let _ = engine.stop().await;
            }
            return Err(e.into());
        }
    }

    let job = ProcessingJob::new(encoded, prompt.unwrap_or_default());
    let outcome = app.registry.run_job(Some(kind), job).await;

    if started_here {
        if let Err(e) = engine.stop().await {
            warn!(error = %e, "Failed to stop local engine");
        }
    }

    let result = outcome?;
    app.history.deliver(&result);
    Ok(result)
}
