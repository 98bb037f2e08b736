//! Mediaflow CLI: upload media, trigger conversions and watch their status.
//!
//! Set MEDIAFLOW_API_KEY (or MEDIAFLOW_TOKEN) and MEDIAFLOW_API_URL (or API_URL).

use anyhow::Context;
use clap::{Parser, Subcommand};
use mediaflow_api_client::{
    ApiClient, AssetUpload, ConversionStatusPoller, ConversionTrigger, IngestPipeline, Session,
    SourceFile, StatusSource,
};
use mediaflow_cli::{init_tracing, parse_file_arg};
use mediaflow_core::validation::TrimLimits;
use mediaflow_core::{
    ClientConfig, ConversionJob, ConversionRequest, FileKind, Orientation, TrimBounds,
    TrimRangeSelector,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "mediaflow", about = "Media ingestion and conversion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct TrimArgs {
    /// Trim start in seconds
    #[arg(long, requires = "end")]
    start: Option<f64>,
    /// Trim end in seconds
    #[arg(long, requires = "start")]
    end: Option<f64>,
    /// Total duration of the video in seconds
    #[arg(long)]
    duration: Option<f64>,
    /// Maximum trimmed length in seconds (defaults to MEDIAFLOW_MAX_TRIM_SECS)
    #[arg(long)]
    max_trim: Option<f64>,
}

impl TrimArgs {
    fn bounds(&self) -> Option<TrimBounds> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(TrimBounds::new(start, end)),
            _ => None,
        }
    }

    fn limits(&self, config: &ClientConfig) -> TrimLimits {
        TrimLimits {
            total_duration: self.duration,
            max_duration: Some(self.max_trim.unwrap_or(config.max_trim_secs)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an asset's files, then convert its main video and wait for it
    Upload {
        /// Asset (post) identifier the conversion is tracked under
        asset_id: String,
        /// File to upload as KIND=PATH, e.g. main_video=clip.mp4 (repeatable)
        #[arg(long = "file", required = true, value_parser = parse_file_arg)]
        files: Vec<(FileKind, PathBuf)>,
        #[command(flatten)]
        trim: TrimArgs,
        /// Orientation hint for the main output
        #[arg(long)]
        main_orientation: Option<Orientation>,
        /// Orientation hint for the sample output
        #[arg(long)]
        sample_orientation: Option<Orientation>,
    },
    /// Request conversion of an already uploaded object
    Convert {
        /// Asset (post) identifier
        asset_id: String,
        /// Temporary storage key returned when the upload was prepared
        #[arg(long)]
        key: String,
        #[command(flatten)]
        trim: TrimArgs,
        /// Content type of the uploaded object
        #[arg(long)]
        content_type: Option<String>,
        /// Wait until the conversion settles
        #[arg(long)]
        wait: bool,
    },
    /// Show the conversion status of an asset
    Status {
        /// Asset (post) identifier
        asset_id: String,
        /// Keep polling until the conversion settles
        #[arg(long)]
        watch: bool,
        /// Require the trimmed sample output as well
        #[arg(long)]
        trimmed: bool,
    },
    /// Check a trim selection without contacting the server
    TrimCheck {
        /// Total duration in seconds
        duration: f64,
        /// Trim start in seconds
        start: f64,
        /// Trim end in seconds
        end: f64,
        /// Maximum trimmed length in seconds
        #[arg(long)]
        max_trim: Option<f64>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; stopping");
            cancel.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()
        .context("Invalid configuration. Check the MEDIAFLOW_* environment variables")?;
    let session = Session::from_config(&config);

    match cli.command {
        Commands::Upload {
            asset_id,
            files,
            trim,
            main_orientation,
            sample_orientation,
        } => {
            if session == Session::Anonymous {
                anyhow::bail!("Set MEDIAFLOW_API_KEY or MEDIAFLOW_TOKEN to upload");
            }
            let mut sources = Vec::with_capacity(files.len());
            for (kind, path) in files {
                let source = SourceFile::from_path(kind, &path)
                    .await
                    .with_context(|| format!("Failed to prepare {}", path.display()))?;
                sources.push(source);
            }

            let mut upload = AssetUpload::new(asset_id, sources)
                .with_orientations(main_orientation, sample_orientation);
            if let Some(bounds) = trim.bounds() {
                upload = upload.with_trim(bounds, trim.limits(&config));
            }

            let pipeline = IngestPipeline::new(&config)?;
            match pipeline.run(&session, &upload, &cancel_on_ctrl_c()).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(err) => {
                    // Keys and job let the user convert or check status later
                    if !err.completed.is_empty() {
                        print_json(&serde_json::json!({ "completed": err.completed }))?;
                    }
                    return Err(err.into());
                }
            }
        }
        Commands::Convert {
            asset_id,
            key,
            trim,
            content_type,
            wait,
        } => {
            let api = Arc::new(ApiClient::new(&config)?);
            let mut request = ConversionRequest::new(key);
            if let Some(bounds) = trim.bounds() {
                request = request.with_trim(bounds);
            }
            if let Some(content_type) = content_type {
                request = request.with_content_type(content_type);
            }

            let job = ConversionTrigger::new(api.clone())
                .request_conversion(&session, &asset_id, &request, trim.limits(&config))
                .await?;
            if wait {
                let outcome = ConversionStatusPoller::from_config(api, &config)
                    .poll(&session, &job, &cancel_on_ctrl_c())
                    .await?;
                print_json(&serde_json::json!({ "job": job, "conversion": outcome }))?;
            } else {
                print_json(&job)?;
            }
        }
        Commands::Status {
            asset_id,
            watch,
            trimmed,
        } => {
            let api = Arc::new(ApiClient::new(&config)?);
            if watch {
                let job = ConversionJob {
                    asset_id,
                    tmp_storage_key: String::new(),
                    needs_trim: trimmed,
                    trim: None,
                    main_orientation: None,
                    sample_orientation: None,
                    content_type: None,
                };
                let outcome = ConversionStatusPoller::from_config(api, &config)
                    .poll(&session, &job, &cancel_on_ctrl_c())
                    .await?;
                print_json(&outcome)?;
            } else {
                let status = api.fetch_status(&session, &asset_id).await?;
                print_json(&status)?;
            }
        }
        Commands::TrimCheck {
            duration,
            start,
            end,
            max_trim,
        } => {
            let mut selector = TrimRangeSelector::new(max_trim.unwrap_or(config.max_trim_secs))?;
            selector.load(duration)?;
            selector.select(start, end)?;
            let (start_label, end_label) = selector.labels().unwrap_or_default();
            let length = selector.selected_length().unwrap_or_default();
            let bounds = selector.confirm()?;
            print_json(&serde_json::json!({
                "start_time": bounds.start_time,
                "end_time": bounds.end_time,
                "length": length,
                "start_label": start_label,
                "end_label": end_label,
            }))?;
        }
    }

    Ok(())
}
