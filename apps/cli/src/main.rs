use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL},
    GeminiConfig, GeminiEditor, RunOutcome, SessionController, RUN_FAILURE_MESSAGE,
};
use shared::domain::{
    is_accepted_media_type, ImageFile, ACCEPTED_MEDIA_TYPES, ADVISORY_MAX_UPLOAD_BYTES,
    DOWNLOAD_FILENAME,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Removes the background from one image and writes the result as PNG.
#[derive(Parser, Debug)]
#[command(name = "bg-remove", version)]
struct Args {
    #[arg(long, short)]
    input: PathBuf,
    #[arg(long, short, default_value = DOWNLOAD_FILENAME)]
    output: PathBuf,
    /// Overrides the media type guessed from the file extension.
    #[arg(long)]
    mime_type: Option<String>,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    #[arg(long, default_value_t = 120)]
    timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let media_type = args
        .mime_type
        .clone()
        .or_else(|| {
            mime_guess::from_path(&args.input)
                .first_raw()
                .map(str::to_string)
        })
        .context("cannot tell the image type from the file name; pass --mime-type")?;
    if !is_accepted_media_type(&media_type) {
        bail!(
            "unsupported media type {media_type}; expected one of {}",
            ACCEPTED_MEDIA_TYPES.join(", ")
        );
    }

    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    if bytes.len() > ADVISORY_MAX_UPLOAD_BYTES {
        warn!(size_bytes = bytes.len(), "image is larger than the advertised 5 MB limit");
    }

    let editor = GeminiEditor::new(gemini_config(&args))?;
    let controller = SessionController::with_editor(Arc::new(editor));
    let filename = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    controller.upload(ImageFile::new(filename, media_type, bytes));

    match controller.run().await {
        RunOutcome::Completed => {}
        RunOutcome::Failed => bail!(
            "{}",
            controller.snapshot().error().unwrap_or(RUN_FAILURE_MESSAGE)
        ),
        other => bail!("run did not complete: {other:?}"),
    }

    let session = controller.snapshot();
    let png = session
        .result_url()
        .context("run completed without a result")?
        .decode()
        .context("result image is unreadable")?;
    tokio::fs::write(&args.output, &png)
        .await
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(output = %args.output.display(), size_bytes = png.len(), "result written");
    println!("{}", args.output.display());
    Ok(())
}

fn gemini_config(args: &Args) -> GeminiConfig {
    let from_env = GeminiConfig::from_env();
    GeminiConfig {
        api_key: args
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or(from_env.api_key),
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        timeout: Duration::from_secs(args.timeout_seconds),
    }
}
