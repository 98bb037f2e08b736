//! Upload credential broker.
//!
//! Asks the application server for one short-lived upload descriptor per file
//! kind. A request either yields a descriptor for every requested kind or fails
//! as a whole.

use async_trait::async_trait;
use chrono::Utc;
use mediaflow_core::models::{descriptors_from_response, DescriptorRequest, DescriptorResponse};
use mediaflow_core::validation::validate_file_specs;
use mediaflow_core::{FileKind, FileSpec, PipelineError, PipelineResult, UploadDescriptor};
use std::collections::BTreeMap;

use crate::{ApiClient, Session};

const DESCRIPTORS_PATH: &str = "/uploads/descriptors";

#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Request descriptors for every file. All-or-nothing.
    async fn request_descriptors(
        &self,
        session: &Session,
        files: &[FileSpec],
    ) -> PipelineResult<BTreeMap<FileKind, UploadDescriptor>>;
}

#[derive(Debug, Clone)]
pub struct UploadCredentialBroker {
    api: ApiClient,
}

impl UploadCredentialBroker {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CredentialBroker for UploadCredentialBroker {
    #[tracing::instrument(skip_all, fields(files = files.len()))]
    async fn request_descriptors(
        &self,
        session: &Session,
        files: &[FileSpec],
    ) -> PipelineResult<BTreeMap<FileKind, UploadDescriptor>> {
        // The server would refuse these too; a malformed list never goes out.
        validate_file_specs(files).map_err(|e| PipelineError::Credential {
            status: None,
            message: match e {
                PipelineError::Validation(msg) => msg,
                other => other.to_string(),
            },
        })?;

        let body = DescriptorRequest {
            files: files.to_vec(),
        };
        let response: DescriptorResponse = self
            .api
            .post_json(session, DESCRIPTORS_PATH, &body)
            .await
            .map_err(|failure| {
                failure.into_error(|status, message| PipelineError::Credential {
                    status: Some(status),
                    message,
                })
            })?;

        let descriptors = descriptors_from_response(files, response, Utc::now())?;
        tracing::info!(
            kinds = ?descriptors.keys().map(|k| k.to_string()).collect::<Vec<_>>(),
            "Upload descriptors issued"
        );
        Ok(descriptors)
    }
}
