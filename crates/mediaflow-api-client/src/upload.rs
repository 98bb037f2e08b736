//! Direct-to-storage uploads.
//!
//! One [`DirectUploadExecutor`] exists per file kind and owns that kind's
//! progress cell. The body is streamed in fixed-size chunks so progress can be
//! reported while the transfer runs. There is no retry loop here; failures are
//! classified and handed back to the caller.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use mediaflow_core::models::UploadMethod;
use mediaflow_core::{
    ClientConfig, FileKind, KindProgress, PipelineError, PipelineResult, UploadDescriptor,
};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::events::{log_error, EventListener, PipelineEvent};
use crate::extract_message;
use crate::progress::ProgressCell;

/// Map a reqwest failure on the upload path. Requests that could not be built
/// (bad header names in a descriptor) will fail the same way again.
fn upload_error(err: reqwest::Error) -> PipelineError {
    if err.is_builder() {
        PipelineError::Upload {
            status: None,
            retryable: false,
            message: format!("Invalid upload request: {}", err),
        }
    } else {
        PipelineError::upload_network(err.to_string())
    }
}

pub struct DirectUploadExecutor {
    client: Client,
    cell: ProgressCell,
    chunk_bytes: usize,
    listener: Arc<dyn EventListener>,
    attempts: AtomicU32,
}

impl DirectUploadExecutor {
    pub fn new(
        config: &ClientConfig,
        cell: ProgressCell,
        listener: Arc<dyn EventListener>,
    ) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(config.upload_timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create upload client: {}", e)))?;
        Ok(Self::with_client(client, cell, config.upload_chunk_bytes, listener))
    }

    pub fn with_client(
        client: Client,
        cell: ProgressCell,
        chunk_bytes: usize,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            client,
            cell,
            chunk_bytes: chunk_bytes.max(1),
            listener,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn kind(&self) -> FileKind {
        self.cell.kind()
    }

    pub fn progress(&self) -> KindProgress {
        self.cell.get()
    }

    /// Number of times `upload` has been called on this executor
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Stream `body` to the descriptor's target. Resolves once storage answers
    /// or `cancel` fires; cancellation discards partial progress.
    pub async fn upload(
        &self,
        descriptor: &UploadDescriptor,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let kind = self.kind();
        if descriptor.kind != kind {
            return Err(PipelineError::Validation(format!(
                "Descriptor for {} cannot be used to upload {}",
                descriptor.kind, kind
            )));
        }

        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if descriptor.is_expired() {
            let err = PipelineError::Upload {
                status: None,
                retryable: false,
                message: format!("Descriptor expired at {}", descriptor.expires_at),
            };
            self.fail(&err);
            return Err(err);
        }

        // A previous attempt's progress is discarded before the new one starts
        if self.cell.reset() {
            self.listener.on_event(&PipelineEvent::UploadReset { kind });
        }
        let size = body.len() as u64;
        self.listener.on_event(&PipelineEvent::UploadStarted {
            kind,
            size_bytes: size,
            attempt,
        });
        tracing::info!(
            kind = %kind,
            attempt = attempt,
            size_bytes = size,
            storage_key = %descriptor.storage_key,
            "Starting direct upload"
        );

        let request = self.build_request(descriptor, body);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.cell.reset();
                self.listener.on_event(&PipelineEvent::UploadReset { kind });
                tracing::info!(kind = %kind, "Upload cancelled");
                return Err(PipelineError::Cancelled(format!("Upload of {} cancelled", kind)));
            }
            result = request.send() => result,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let err = upload_error(e);
                self.fail(&err);
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = PipelineError::upload_status(status.as_u16(), extract_message(&text));
            self.fail(&err);
            return Err(err);
        }

        self.cell.complete();
        self.listener
            .on_event(&PipelineEvent::UploadProgress { kind, percent: 100 });
        self.listener.on_event(&PipelineEvent::UploadCompleted { kind });
        tracing::info!(kind = %kind, status = status.as_u16(), "Direct upload finished");
        Ok(())
    }

    fn build_request(&self, descriptor: &UploadDescriptor, body: Bytes) -> reqwest::RequestBuilder {
        let target = &descriptor.upload_target;
        let mut request = match target.method {
            UploadMethod::Put => self.client.put(&target.url),
            UploadMethod::Post => self.client.post(&target.url),
        };
        // Content-Length always comes from the body actually sent
        for (name, value) in &descriptor.required_headers {
            if name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        let total = body.len() as u64;
        let chunks = split_chunks(body, self.chunk_bytes);
        let cell = self.cell.share();
        let listener = Arc::clone(&self.listener);
        let mut sent = 0u64;
        let stream = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            let percent = KindProgress::percent_of(sent, total);
            // 100% is reserved for the storage acknowledgement.
            if percent < 100 && cell.advance(percent) {
                listener.on_event(&PipelineEvent::UploadProgress {
                    kind: cell.kind(),
                    percent,
                });
            }
            Ok::<Bytes, std::io::Error>(chunk)
        });

        request
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream))
    }

    /// Failure keeps the progress where it stopped so the caller can show it
    fn fail(&self, err: &PipelineError) {
        log_error(err, "Direct upload failed");
        self.listener
            .on_event(&PipelineEvent::upload_failed(self.kind(), err));
    }
}

fn split_chunks(body: Bytes, chunk_bytes: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(body.len() / chunk_bytes + 1);
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + chunk_bytes).min(body.len());
        chunks.push(body.slice(offset..end));
        offset = end;
    }
    chunks
}
