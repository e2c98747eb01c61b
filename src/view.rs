//! Contract between the controller and presentational stage views.
//!
//! A view renders the [`DocumentSlice`] of its stage, asks the controller
//! for something through a [`ViewRequest`], and observes `in_flight` /
//! `last_error` through [`ViewStatus`]. How a view solicits the payload (a
//! text editor, a file picker, a JSON file on disk) is its own business; the
//! controller only checks the payload's shape.
//!
//! There is exactly one contract per stage. Whether the Edit stage accepts
//! changes is configuration (`DocumentSlice::Edit { editable, .. }`), not a
//! second view type.

use crate::controller::{Payload, PipelineState};
use crate::document::{DocumentSlice, PipelineDocument, Stage};
use crate::error::PipelineError;
use std::time::Duration;

/// Something a view asks the controller to do.
#[derive(Debug, Clone)]
pub enum ViewRequest {
    /// Send `stage` to its service with `payload`.
    Submit { stage: Stage, payload: Payload },
    /// Move forward reusing cached output.
    Advance,
    /// Step back one stage.
    Retreat,
    /// Abandon the session.
    Reset,
}

impl ViewRequest {
    pub fn submit(stage: Stage, payload: Payload) -> Self {
        ViewRequest::Submit { stage, payload }
    }
}

/// Controller flags a view may display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewStatus {
    pub in_flight: bool,
    pub last_error: Option<PipelineError>,
}

impl From<&PipelineState> for ViewStatus {
    fn from(state: &PipelineState) -> Self {
        Self {
            in_flight: state.in_flight,
            last_error: state.last_error.clone(),
        }
    }
}

/// A presentational stage.
///
/// `render` and `request` receive the slice for the controller's current
/// stage; a view covering several stages matches on [`DocumentSlice`].
pub trait StageView {
    /// Present the current slice and status.
    fn render(&mut self, slice: DocumentSlice<'_>, status: &ViewStatus);

    /// Next request for the controller, or `None` to stop.
    fn request(&mut self, slice: DocumentSlice<'_>, status: &ViewStatus) -> Option<ViewRequest>;

    /// Outcome of the last request issued from `stage`.
    fn observe(&mut self, stage: Stage, outcome: &Result<PipelineDocument, PipelineError>) {
        let _ = (stage, outcome);
    }

    /// Delay to wait before dispatching the next request.
    fn backoff(&self) -> Option<Duration> {
        None
    }
}
