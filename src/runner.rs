//! Driving a controller from a view, plus a headless view.
//!
//! [`drive`] is the loop every front-end shares: render, ask the view for a
//! request, dispatch it, report the outcome, repeat until the view stops.
//! [`AutoView`] walks a document through all five stages without a user,
//! which is what the `schematize` binary and batch callers want.
//!
//! ## Retry Strategy
//!
//! Retries are a view concern; the controller never retries. `AutoView`
//! resubmits a stage after a recoverable failure with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`), up to `max_attempts` tries.

use crate::controller::{Payload, StepController};
use crate::document::{DocumentSlice, PipelineDocument, SchematizedSection, SourceFile, Stage};
use crate::error::{PipelineError, SchematizeError};
use crate::view::{StageView, ViewRequest, ViewStatus};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pump `view` until it stops issuing requests.
///
/// Returns the final document, or the error of the last request if the view
/// stopped right after a failure.
pub async fn drive<V>(
    controller: &StepController,
    view: &mut V,
) -> Result<PipelineDocument, PipelineError>
where
    V: StageView + ?Sized,
{
    let mut last_failure: Option<PipelineError> = None;

    loop {
        let state = controller.snapshot();
        let status = ViewStatus::from(&state);
        let slice = state.document.slice_for(state.stage, controller.is_editable());

        view.render(slice, &status);
        let Some(request) = view.request(slice, &status) else {
            break;
        };

        if let Some(delay) = view.backoff() {
            debug!("Waiting {:?} before next request", delay);
            tokio::time::sleep(delay).await;
        }

        let outcome = controller.dispatch(request).await;
        view.observe(state.stage, &outcome);
        last_failure = outcome.err();
    }

    match last_failure {
        Some(e) => Err(e),
        None => Ok(controller.document()),
    }
}

/// Headless view that submits every stage in order.
#[derive(Debug, Clone)]
pub struct AutoView {
    source: SourceFile,
    edits: Option<Vec<SchematizedSection>>,
    max_attempts: u32,
    retry_backoff_ms: u64,
    failures: u32,
    gave_up: bool,
}

impl AutoView {
    pub fn new(source: SourceFile) -> Self {
        Self {
            source,
            edits: None,
            max_attempts: 3,
            retry_backoff_ms: 500,
            failures: 0,
            gave_up: false,
        }
    }

    /// Schematization to submit at the Edit stage in place of the generated one.
    pub fn with_edits(mut self, edits: Vec<SchematizedSection>) -> Self {
        self.edits = Some(edits);
        self
    }

    /// Tries per stage, including the first. Minimum 1. Default: 3.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Initial retry delay in milliseconds. Default: 500.
    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn gave_up(&self) -> bool {
        self.gave_up
    }
}

impl StageView for AutoView {
    fn render(&mut self, slice: DocumentSlice<'_>, status: &ViewStatus) {
        if let Some(ref e) = status.last_error {
            debug!("{}: last error: {}", slice.stage(), e);
        }
    }

    fn request(&mut self, slice: DocumentSlice<'_>, _status: &ViewStatus) -> Option<ViewRequest> {
        if self.gave_up {
            return None;
        }
        let stage = slice.stage();
        let payload = match slice {
            DocumentSlice::Upload { .. } => Payload::upload(self.source.clone()),
            DocumentSlice::Edit { editable, .. } => match self.edits {
                Some(ref edits) if editable => {
                    Payload::current().with_schematization(edits.clone())
                }
                Some(_) => {
                    warn!("Edit stage is read-only; ignoring supplied edits");
                    Payload::current()
                }
                None => Payload::current(),
            },
            DocumentSlice::Export {
                export_ref: Some(_),
                ..
            } => return None,
            _ => Payload::current(),
        };
        Some(ViewRequest::submit(stage, payload))
    }

    fn observe(&mut self, stage: Stage, outcome: &Result<PipelineDocument, PipelineError>) {
        match outcome {
            Ok(_) => self.failures = 0,
            Err(e) if e.is_recoverable() => {
                self.failures += 1;
                if self.failures >= self.max_attempts {
                    warn!("{} failed {} times; giving up: {}", stage, self.failures, e);
                    self.gave_up = true;
                } else {
                    info!(
                        "{} failed (attempt {}/{}): {}",
                        stage, self.failures, self.max_attempts, e
                    );
                }
            }
            Err(e) => {
                warn!("{} refused: {}", stage, e);
                self.gave_up = true;
            }
        }
    }

    fn backoff(&self) -> Option<Duration> {
        if self.failures == 0 || self.retry_backoff_ms == 0 {
            return None;
        }
        let factor = 2u64.saturating_pow(self.failures - 1);
        Some(Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor)))
    }
}

/// Write `document` as pretty JSON to `path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn save_document(
    document: &PipelineDocument,
    path: impl AsRef<Path>,
) -> Result<(), SchematizeError> {
    let path = path.as_ref();
    let write_failed = |source: std::io::Error| SchematizeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(document)
        .map_err(|e| SchematizeError::Internal(format!("serialise document: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}
