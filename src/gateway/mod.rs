//! Stage gateways: one external call per stage.
//!
//! Each method translates a stage's semantic input into exactly one request
//! through a [`Transport`], validates the reply and returns either a typed
//! fragment or a [`PipelineError`]. Nothing here retries, and nothing here
//! touches pipeline state; merging is the controller's job.
//!
//! ## Response policy
//!
//! | Stage | field | absent / `null` |
//! |-------|-------|-----------------|
//! | Upload | `structure` | `MalformedResponse` |
//! | Structure | `summarized` | request's `structure` |
//! | Schematization | `schematization` | empty list |
//! | Edit | `edited` | request's `schematization` |
//! | Export | `file_url` | export without URL |
//!
//! An explicitly empty list is always a successful reply; whether the
//! pipeline may move past it is decided by the controller.

pub mod transport;
pub mod wire;

pub use transport::{HttpTransport, Transport, TransportError};

use crate::config::{EndpointPaths, PipelineConfig};
use crate::document::{first_untitled, ExportRef, SchematizedSection, Section, SourceFile, Stage};
use crate::error::{PipelineError, SchematizeError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use wire::{take_field, EditRequest, ExportRequest, StructureRequest};

/// Owned input for one gateway call.
#[derive(Debug, Clone)]
pub enum StageInput {
    Upload(SourceFile),
    Structure {
        structure: Vec<Section>,
    },
    Schematization {
        structure: Vec<Section>,
    },
    Edit {
        structure: Vec<Section>,
        schematization: Vec<SchematizedSection>,
    },
    Export {
        structure: Vec<Section>,
        schematization: Vec<SchematizedSection>,
    },
}

impl StageInput {
    pub fn stage(&self) -> Stage {
        match self {
            StageInput::Upload(_) => Stage::Upload,
            StageInput::Structure { .. } => Stage::Structure,
            StageInput::Schematization { .. } => Stage::Schematization,
            StageInput::Edit { .. } => Stage::Edit,
            StageInput::Export { .. } => Stage::Export,
        }
    }
}

/// Validated fragment returned by a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    Extracted(Vec<Section>),
    Summarized(Vec<Section>),
    Schematized(Vec<SchematizedSection>),
    Edited(Vec<SchematizedSection>),
    Exported(ExportRef),
}

/// Gateway to the processing service for all five stages.
#[derive(Clone)]
pub struct StageGateway {
    transport: Arc<dyn Transport>,
    endpoints: EndpointPaths,
    upload_field: String,
    export_format: String,
}

impl std::fmt::Debug for StageGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGateway")
            .field("endpoints", &self.endpoints)
            .field("upload_field", &self.upload_field)
            .field("export_format", &self.export_format)
            .finish_non_exhaustive()
    }
}

impl StageGateway {
    /// Build a gateway from config, resolving the transport.
    ///
    /// 1. **Injected transport** (`config.transport`): used as-is.
    /// 2. **Base URL** (`config.base_url`, then `SCHEMATIZE_API_URL`): an
    ///    [`HttpTransport`] is built with the configured timeouts.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, SchematizeError> {
        let transport: Arc<dyn Transport> = match config.transport {
            Some(ref t) => Arc::clone(t),
            None => {
                let base_url = config.resolved_base_url().ok_or_else(|| {
                    SchematizeError::ServiceNotConfigured {
                        hint: format!(
                            "Set a base URL (--base-url or {}) pointing at the processing service.",
                            crate::config::BASE_URL_ENV
                        ),
                    }
                })?;
                info!("Using processing service at {}", base_url);
                Arc::new(HttpTransport::new(
                    base_url,
                    config.api_timeout_secs,
                    config.connect_timeout_secs,
                )?)
            }
        };

        Ok(Self {
            transport,
            endpoints: config.endpoints.clone(),
            upload_field: config.upload_field.clone(),
            export_format: config.export_format.clone(),
        })
    }

    /// Perform the call bound to `input`'s stage.
    pub async fn invoke(&self, input: StageInput) -> Result<StageOutput, PipelineError> {
        match input {
            StageInput::Upload(source) => self.extract(&source).await.map(StageOutput::Extracted),
            StageInput::Structure { structure } => {
                self.summarize(&structure).await.map(StageOutput::Summarized)
            }
            StageInput::Schematization { structure } => {
                self.schematize(&structure).await.map(StageOutput::Schematized)
            }
            StageInput::Edit {
                structure,
                schematization,
            } => self
                .edit(&structure, &schematization)
                .await
                .map(StageOutput::Edited),
            StageInput::Export {
                structure,
                schematization,
            } => self
                .export(&structure, &schematization)
                .await
                .map(StageOutput::Exported),
        }
    }

    /// Upload: raw document → extracted structure.
    pub async fn extract(&self, source: &SourceFile) -> Result<Vec<Section>, PipelineError> {
        let stage = Stage::Upload;
        let mut body = self
            .transport
            .post_file(&self.endpoints.extract, &self.upload_field, source)
            .await
            .map_err(|e| transport_failure(stage, e))?;

        let structure = take_field::<Vec<Section>>(&mut body, "structure")
            .map_err(|detail| malformed(stage, detail))?
            .ok_or_else(|| malformed(stage, "missing `structure`".to_string()))?;
        debug!("Extracted {} sections from {}", structure.len(), source.file_name());
        Ok(structure)
    }

    /// Structure: reorganize the structure; falls back to the input.
    pub async fn summarize(&self, structure: &[Section]) -> Result<Vec<Section>, PipelineError> {
        let stage = Stage::Structure;
        let mut body = self
            .post(stage, &self.endpoints.summarize, &StructureRequest { structure })
            .await?;

        match take_field::<Vec<Section>>(&mut body, "summarized")
            .map_err(|d| malformed(stage, d))?
        {
            Some(summarized) => Ok(summarized),
            None => {
                debug!("No `summarized` in reply; keeping submitted structure");
                Ok(structure.to_vec())
            }
        }
    }

    /// Schematization: one schematized entry per (kept) section.
    pub async fn schematize(
        &self,
        structure: &[Section],
    ) -> Result<Vec<SchematizedSection>, PipelineError> {
        let stage = Stage::Schematization;
        let mut body = self
            .post(stage, &self.endpoints.schematize, &StructureRequest { structure })
            .await?;

        let schematization = take_field::<Vec<SchematizedSection>>(&mut body, "schematization")
            .map_err(|d| malformed(stage, d))?
            .unwrap_or_else(|| {
                debug!("No `schematization` in reply; treating as empty");
                Vec::new()
            });
        require_titles(stage, schematization)
    }

    /// Edit: persist edits; falls back to the submitted schematization.
    pub async fn edit(
        &self,
        structure: &[Section],
        schematization: &[SchematizedSection],
    ) -> Result<Vec<SchematizedSection>, PipelineError> {
        let stage = Stage::Edit;
        let request = EditRequest {
            structure,
            schematization,
        };
        let mut body = self.post(stage, &self.endpoints.edit, &request).await?;

        match take_field::<Vec<SchematizedSection>>(&mut body, "edited")
            .map_err(|d| malformed(stage, d))?
        {
            Some(edited) => require_titles(stage, edited),
            None => {
                debug!("No `edited` in reply; keeping submitted schematization");
                Ok(schematization.to_vec())
            }
        }
    }

    /// Export: produce the artifact; a reply without `file_url` still succeeds.
    pub async fn export(
        &self,
        structure: &[Section],
        schematization: &[SchematizedSection],
    ) -> Result<ExportRef, PipelineError> {
        let stage = Stage::Export;
        let request = ExportRequest {
            structure,
            schematization,
            export_format: &self.export_format,
        };
        let mut body = self.post(stage, &self.endpoints.export, &request).await?;

        let file_url = take_field::<String>(&mut body, "file_url")
            .map_err(|d| malformed(stage, d))?
            .filter(|u| !u.trim().is_empty());
        if file_url.is_none() {
            debug!("Export reply carries no `file_url`");
        }
        Ok(ExportRef {
            file_url,
            format: self.export_format.clone(),
        })
    }

    async fn post<T: Serialize>(
        &self,
        stage: Stage,
        endpoint: &str,
        request: &T,
    ) -> Result<Value, PipelineError> {
        let body = serde_json::to_value(request).map_err(|e| PipelineError::MalformedResponse {
            stage,
            detail: format!("could not encode request: {e}"),
        })?;
        self.transport
            .post_json(endpoint, body)
            .await
            .map_err(|e| transport_failure(stage, e))
    }
}

fn require_titles(
    stage: Stage,
    sections: Vec<SchematizedSection>,
) -> Result<Vec<SchematizedSection>, PipelineError> {
    match first_untitled(&sections) {
        Some(index) => Err(malformed(
            stage,
            format!("schematized section #{index} has an empty title"),
        )),
        None => Ok(sections),
    }
}

fn malformed(stage: Stage, detail: String) -> PipelineError {
    PipelineError::MalformedResponse { stage, detail }
}

fn transport_failure(stage: Stage, e: TransportError) -> PipelineError {
    match e {
        TransportError::Unreachable { reason } => {
            PipelineError::ServiceUnreachable { stage, reason }
        }
        e @ TransportError::NotJson { .. } => malformed(stage, e.to_string()),
    }
}
