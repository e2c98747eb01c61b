//! Error types for the schematize-pipeline library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SchematizeError`] — **Fatal**: the session cannot be set up at all
//!   (bad configuration, unreadable source file, failed download). Returned
//!   from constructors and I/O helpers, never from a stage submission.
//!
//! * [`PipelineError`] — **Recoverable**: one stage submission failed or was
//!   refused. Stored as `last_error` on [`crate::controller::PipelineState`]
//!   so a view can display it and offer resubmission. Apart from that field
//!   the pipeline state is never modified by a failure.

use crate::document::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the schematize-pipeline library.
///
/// Stage-level failures use [`PipelineError`] and surface through
/// [`crate::controller::StepController::submit`] instead.
#[derive(Debug, Error)]
pub enum SchematizeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Service errors ────────────────────────────────────────────────────
    /// No transport was injected and no base address is known.
    #[error("Processing service is not configured.\n{hint}")]
    ServiceNotConfigured { hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A typed failure of one stage submission.
///
/// Everything except [`PipelineError::Superseded`] is recorded as
/// `last_error` when it results from an external call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// Transport-level failure talking to the processing service.
    #[error("{stage} service unreachable: {reason}")]
    ServiceUnreachable { stage: Stage, reason: String },

    /// The service answered but the body lacks or mistypes the required field.
    #[error("{stage} service returned a malformed response: {detail}")]
    MalformedResponse { stage: Stage, detail: String },

    /// The caller asked for something the current state does not permit.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(Precondition),

    /// The response arrived after a reset and was discarded.
    #[error("Response discarded: pipeline was reset (generation {generation})")]
    Superseded { generation: u64 },
}

impl PipelineError {
    /// Whether resubmitting the same stage could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::ServiceUnreachable { .. } | PipelineError::MalformedResponse { .. }
        )
    }

    /// The stage this error is attributed to, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::ServiceUnreachable { stage, .. }
            | PipelineError::MalformedResponse { stage, .. } => Some(*stage),
            PipelineError::PreconditionFailed(p) => p.stage(),
            PipelineError::Superseded { .. } => None,
        }
    }
}

impl From<Precondition> for PipelineError {
    fn from(p: Precondition) -> Self {
        PipelineError::PreconditionFailed(p)
    }
}

/// Why the controller refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Precondition {
    /// Another submission is still outstanding.
    #[error("a submission is already in flight")]
    InFlight,

    /// The request targeted a stage other than the current one.
    #[error("request targets {requested} but the pipeline is at {current}")]
    StageMismatch { requested: Stage, current: Stage },

    /// The structure is empty where a non-empty one is required.
    #[error("structure is empty; cannot leave {stage}")]
    EmptyStructure { stage: Stage },

    /// Export is the last stage.
    #[error("{stage} is the terminal stage")]
    Terminal { stage: Stage },

    /// Upload was submitted without a source document.
    #[error("no source document supplied for upload")]
    MissingSource,

    /// The payload carries a field the stage does not accept.
    #[error("{stage} does not accept a {field} override")]
    UnexpectedPayload { stage: Stage, field: String },

    /// Edited schematization supplied while the Edit stage is read-only.
    #[error("the edit stage is configured read-only")]
    EditingDisabled,

    /// A schematized section in the payload has an empty title.
    #[error("schematized section #{index} has an empty title")]
    UntitledSection { index: usize },

    /// `advance` was requested but the stage has no cached output.
    #[error("{stage} has no cached output to advance past; submit it first")]
    NothingCached { stage: Stage },
}

impl Precondition {
    fn stage(&self) -> Option<Stage> {
        match self {
            Precondition::StageMismatch { requested, .. } => Some(*requested),
            Precondition::EmptyStructure { stage }
            | Precondition::Terminal { stage }
            | Precondition::UnexpectedPayload { stage, .. }
            | Precondition::NothingCached { stage } => Some(*stage),
            Precondition::MissingSource => Some(Stage::Upload),
            Precondition::EditingDisabled | Precondition::UntitledSection { .. } => {
                Some(Stage::Edit)
            }
            Precondition::InFlight => None,
        }
    }
}
