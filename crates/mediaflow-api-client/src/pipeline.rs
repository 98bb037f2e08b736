//! Ingestion pipeline for one asset.
//!
//! Runs broker, uploads, conversion trigger and status polling in that order.
//! Uploads for distinct kinds run concurrently on the calling task. The
//! conversion is only triggered once every upload of the asset has succeeded.
//! A failed run reports the steps it completed so a later run can pick up
//! from there.

use bytes::Bytes;
use futures::future::join_all;
use mediaflow_core::trim::validate_bounds;
use mediaflow_core::validation::{validate_file_specs, TrimLimits};
use mediaflow_core::{
    ClientConfig, ConversionJob, ConversionRequest, FileKind, FileSpec, KindProgress,
    Orientation, PipelineError, PipelineResult, RetryPolicy, TrimBounds, UploadDescriptor,
};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::broker::{CredentialBroker, UploadCredentialBroker};
use crate::conversion::{ConversionApi, ConversionTrigger};
use crate::events::{log_error, EventListener, PipelineEvent, TracingListener};
use crate::poller::{ConversionStatusPoller, PollOutcome, StatusSource};
use crate::progress::{ProgressBoard, ProgressCell};
use crate::upload::DirectUploadExecutor;
use crate::{ApiClient, Session};

/// One file of an asset, already in memory
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub spec: FileSpec,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(spec: FileSpec, bytes: impl Into<Bytes>) -> Self {
        Self {
            spec,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, deriving content type and extension from its
    /// name.
    pub async fn from_path(kind: FileKind, path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let content_type = kind.content_type_for_extension(&ext).ok_or_else(|| {
            PipelineError::Validation(format!(
                "{} cannot be uploaded as {}: allowed extensions are {}",
                path.display(),
                kind,
                kind.allowed_extensions().join(", ")
            ))
        })?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PipelineError::Validation(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(Self::new(FileSpec::new(kind, content_type, ext), bytes))
    }
}

/// Everything needed to ingest one asset
#[derive(Debug, Clone)]
pub struct AssetUpload {
    /// Identifier the server tracks the conversion under
    pub asset_id: String,
    pub files: Vec<SourceFile>,
    /// Confirmed trim selection; a sample is cut when present
    pub trim: Option<TrimBounds>,
    pub limits: TrimLimits,
    pub main_orientation: Option<Orientation>,
    pub sample_orientation: Option<Orientation>,
}

impl AssetUpload {
    pub fn new(asset_id: impl Into<String>, files: Vec<SourceFile>) -> Self {
        Self {
            asset_id: asset_id.into(),
            files,
            trim: None,
            limits: TrimLimits::default(),
            main_orientation: None,
            sample_orientation: None,
        }
    }

    pub fn with_trim(mut self, trim: TrimBounds, limits: TrimLimits) -> Self {
        self.trim = Some(trim);
        self.limits = limits;
        self
    }

    pub fn with_orientations(
        mut self,
        main: Option<Orientation>,
        sample: Option<Orientation>,
    ) -> Self {
        self.main_orientation = main;
        self.sample_orientation = sample;
        self
    }

    fn specs(&self) -> Vec<FileSpec> {
        self.files.iter().map(|f| f.spec.clone()).collect()
    }

    /// The conversion this asset needs, if it carries a main video
    fn conversion_request(&self, storage_key: &str) -> Option<ConversionRequest> {
        let main = self
            .files
            .iter()
            .find(|f| f.spec.kind == FileKind::MainVideo)?;
        let mut request = ConversionRequest::new(storage_key)
            .with_orientations(self.main_orientation, self.sample_orientation)
            .with_content_type(main.spec.content_type.clone());
        if let Some(trim) = self.trim {
            request = request.with_trim(trim);
        }
        Some(request)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// Storage key of every uploaded file
    pub storage_keys: BTreeMap<FileKind, String>,
    pub progress: BTreeMap<FileKind, KindProgress>,
    /// Present when the asset had a main video
    pub job: Option<ConversionJob>,
    pub conversion: Option<PollOutcome>,
}

/// Steps of an ingestion run that finished before it stopped. Handing this
/// back to [`IngestPipeline::resume`] skips them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletedWork {
    /// Files already in storage, by kind
    pub storage_keys: BTreeMap<FileKind, String>,
    /// Kinds still to upload
    pub pending: Vec<FileKind>,
    /// Set once the conversion was accepted
    pub job: Option<ConversionJob>,
}

impl CompletedWork {
    pub fn is_empty(&self) -> bool {
        self.storage_keys.is_empty() && self.job.is_none()
    }
}

/// A failed ingestion run, with whatever it got done
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct IngestError {
    pub error: PipelineError,
    pub completed: CompletedWork,
}

impl IngestError {
    fn new(error: PipelineError, completed: CompletedWork) -> Self {
        Self { error, completed }
    }
}

impl From<PipelineError> for IngestError {
    fn from(error: PipelineError) -> Self {
        Self::new(error, CompletedWork::default())
    }
}

pub struct IngestPipeline {
    broker: Arc<dyn CredentialBroker>,
    conversions: Arc<dyn ConversionApi>,
    statuses: Arc<dyn StatusSource>,
    upload_client: Client,
    config: ClientConfig,
    retry: RetryPolicy,
    listener: Arc<dyn EventListener>,
}

impl IngestPipeline {
    pub fn new(config: &ClientConfig) -> PipelineResult<Self> {
        let api = ApiClient::new(config)?;
        let upload_client = Client::builder()
            .timeout(config.upload_timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create upload client: {}", e)))?;
        let api = Arc::new(api);

        Ok(Self {
            broker: Arc::new(UploadCredentialBroker::new(api.as_ref().clone())),
            conversions: api.clone(),
            statuses: api,
            upload_client,
            config: config.clone(),
            retry: config.retry_policy(),
            listener: Arc::new(TracingListener),
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn CredentialBroker>) -> Self {
        self.broker = broker;
        self
    }

    /// Ingest `upload` from scratch.
    pub async fn run(
        &self,
        session: &Session,
        upload: &AssetUpload,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, IngestError> {
        self.resume(session, upload, CompletedWork::default(), cancel)
            .await
    }

    /// Continue an ingestion from `completed`, usually taken from a failed
    /// run's [`IngestError`]. Uploaded kinds are not brokered or sent again and
    /// an accepted job is not triggered again.
    #[tracing::instrument(skip_all, fields(asset_id = %upload.asset_id, files = upload.files.len()))]
    pub async fn resume(
        &self,
        session: &Session,
        upload: &AssetUpload,
        completed: CompletedWork,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, IngestError> {
        let specs = upload.specs();
        if let Err(err) = self.precheck(upload, &specs) {
            log_error(&err, "Asset rejected before upload");
            return Err(IngestError::new(err, completed));
        }

        let CompletedWork {
            mut storage_keys,
            job,
            ..
        } = completed;
        let (board, mut cells) = ProgressBoard::new(specs.iter().map(|s| s.kind));
        for kind in storage_keys.keys() {
            if let Some(cell) = cells.remove(kind) {
                cell.complete();
            }
        }
        let pending: Vec<&SourceFile> = upload
            .files
            .iter()
            .filter(|f| !storage_keys.contains_key(&f.spec.kind))
            .collect();

        if !pending.is_empty() {
            if !storage_keys.is_empty() {
                tracing::info!(
                    uploaded = storage_keys.len(),
                    pending = pending.len(),
                    "Resuming asset upload"
                );
            }
            let failed = self
                .upload_pending(session, &pending, &mut cells, &mut storage_keys, cancel)
                .await;
            if let Err(err) = failed {
                let pending = upload
                    .files
                    .iter()
                    .map(|f| f.spec.kind)
                    .filter(|kind| !storage_keys.contains_key(kind))
                    .collect();
                tracing::warn!(
                    uploaded = storage_keys.len(),
                    total = upload.files.len(),
                    "Asset upload incomplete; conversion not requested"
                );
                return Err(IngestError::new(
                    err,
                    CompletedWork {
                        storage_keys,
                        pending,
                        job,
                    },
                ));
            }
        }

        let mut outcome = IngestOutcome {
            progress: board.snapshot(),
            storage_keys,
            job: None,
            conversion: None,
        };
        let done = |job: Option<ConversionJob>, keys: &BTreeMap<FileKind, String>| {
            CompletedWork {
                storage_keys: keys.clone(),
                pending: Vec::new(),
                job,
            }
        };

        let job = match job {
            Some(job) => job,
            None => {
                let request = outcome
                    .storage_keys
                    .get(&FileKind::MainVideo)
                    .and_then(|key| upload.conversion_request(key));
                let Some(request) = request else {
                    tracing::info!("No main video; nothing to convert");
                    return Ok(outcome);
                };
                let trigger = ConversionTrigger::new(Arc::clone(&self.conversions))
                    .with_listener(Arc::clone(&self.listener));
                trigger
                    .request_conversion(session, &upload.asset_id, &request, upload.limits)
                    .await
                    .map_err(|err| IngestError::new(err, done(None, &outcome.storage_keys)))?
            }
        };

        let conversion = match self.resume_conversion(session, &job, cancel).await {
            Ok(conversion) => conversion,
            Err(err) => {
                return Err(IngestError::new(
                    err,
                    done(Some(job), &outcome.storage_keys),
                ))
            }
        };

        outcome.job = Some(job);
        outcome.conversion = Some(conversion);
        Ok(outcome)
    }

    /// Poll an accepted job again with a fresh attempt budget, e.g. after a
    /// run ended in `PollingExhausted`.
    pub async fn resume_conversion(
        &self,
        session: &Session,
        job: &ConversionJob,
        cancel: &CancellationToken,
    ) -> PipelineResult<PollOutcome> {
        ConversionStatusPoller::from_config(Arc::clone(&self.statuses), &self.config)
            .with_listener(Arc::clone(&self.listener))
            .poll(session, job, cancel)
            .await
    }

    /// Broker and upload `pending` concurrently, recording each success in
    /// `storage_keys`. The first terminal failure stops the other uploads.
    async fn upload_pending(
        &self,
        session: &Session,
        pending: &[&SourceFile],
        cells: &mut BTreeMap<FileKind, ProgressCell>,
        storage_keys: &mut BTreeMap<FileKind, String>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let specs: Vec<FileSpec> = pending.iter().map(|f| f.spec.clone()).collect();
        let mut descriptors = self.broker.request_descriptors(session, &specs).await?;
        self.listener.on_event(&PipelineEvent::DescriptorsIssued {
            kinds: descriptors.keys().copied().collect(),
        });

        let mut work = Vec::with_capacity(pending.len());
        for file in pending {
            let kind = file.spec.kind;
            let (Some(cell), Some(descriptor)) = (cells.remove(&kind), descriptors.remove(&kind))
            else {
                return Err(PipelineError::Decode(format!("No upload slot for {}", kind)));
            };
            let executor = DirectUploadExecutor::with_client(
                self.upload_client.clone(),
                cell,
                self.config.upload_chunk_bytes,
                Arc::clone(&self.listener),
            );
            work.push((*file, executor, descriptor));
        }

        let siblings = cancel.child_token();
        let results = join_all(work.iter().map(|(file, executor, descriptor)| {
            let siblings = &siblings;
            async move {
                let result = self
                    .upload_with_retry(session, executor, file, descriptor.clone(), siblings)
                    .await;
                if let Err(err) = &result {
                    if !matches!(err, PipelineError::Cancelled(_)) {
                        siblings.cancel();
                    }
                }
                result
            }
        }))
        .await;

        let mut first_error: Option<PipelineError> = None;
        for ((file, _, _), result) in work.iter().zip(results) {
            match result {
                Ok(key) => {
                    storage_keys.insert(file.spec.kind, key);
                }
                // Sibling cancellations only win when nothing else failed
                Err(err) => {
                    let replace = match &first_error {
                        None => true,
                        Some(PipelineError::Cancelled(_)) => {
                            !matches!(err, PipelineError::Cancelled(_))
                        }
                        Some(_) => false,
                    };
                    if replace {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Everything that can be rejected without the network. Trim bounds are
    /// checked here so an invalid selection never costs an upload.
    fn precheck(&self, upload: &AssetUpload, specs: &[FileSpec]) -> PipelineResult<()> {
        validate_file_specs(specs)?;
        let Some(trim) = upload.trim else {
            return Ok(());
        };
        if !specs.iter().any(|s| s.kind == FileKind::MainVideo) {
            return Err(PipelineError::Validation(
                "A trim selection needs a main video".to_string(),
            ));
        }
        validate_bounds(
            trim.start_time,
            trim.end_time,
            upload.limits.total_duration.unwrap_or(f64::INFINITY),
            upload.limits.max_duration.unwrap_or(f64::INFINITY),
        )
    }

    /// Upload one file, retrying per the policy. Transient failures reuse the
    /// descriptor; rejected or expired descriptors are re-issued for this kind
    /// only. Returns the storage key on success.
    async fn upload_with_retry(
        &self,
        session: &Session,
        executor: &DirectUploadExecutor,
        file: &SourceFile,
        mut descriptor: UploadDescriptor,
        cancel: &CancellationToken,
    ) -> PipelineResult<String> {
        let kind = file.spec.kind;
        let mut retries = 0;

        loop {
            let err = match executor.upload(&descriptor, file.bytes.clone(), cancel).await {
                Ok(()) => return Ok(descriptor.storage_key),
                Err(err) => err,
            };

            let rebroker = err.needs_new_descriptor();
            if !(rebroker || err.is_retryable_upload()) || !self.retry.should_retry(retries) {
                return Err(err);
            }
            retries += 1;

            let delay = self.retry.backoff(retries);
            tracing::info!(
                kind = %kind,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                new_descriptor = rebroker,
                "Retrying upload"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PipelineError::Cancelled(format!("Upload of {} cancelled", kind)));
                }
                _ = sleep(delay) => {}
            }

            if rebroker {
                descriptor = self.reissue(session, &file.spec).await?;
            }
        }
    }

    async fn reissue(&self, session: &Session, spec: &FileSpec) -> PipelineResult<UploadDescriptor> {
        let mut issued = self
            .broker
            .request_descriptors(session, std::slice::from_ref(spec))
            .await?;
        issued
            .remove(&spec.kind)
            .ok_or_else(|| PipelineError::Decode(format!("No descriptor re-issued for {}", spec.kind)))
    }
}
