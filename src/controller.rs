//! The step controller: sole owner of pipeline state.
//!
//! [`StepController`] holds the current [`PipelineState`] inside a
//! `tokio::sync::watch` channel. Every transition goes through one of its
//! methods; views receive clones or a watch receiver and never mutate state.
//!
//! ## Single flight
//!
//! `submit` flips `in_flight` synchronously before its only suspension point
//! (the gateway call). While it is set, a second `submit`, `advance` or
//! `retreat` is refused with [`Precondition::InFlight`]. The state lock is
//! never held across an `.await`.
//!
//! ## Stale responses
//!
//! `reset` bumps a generation counter. `submit` captures the generation when
//! it starts and, when the reply arrives, drops it if the counter moved:
//!
//! ```text
//! submit (gen 3) ──▶ call ─────────────────────▶ reply: gen 3 ≠ 4, dropped
//!                         reset (gen 3 → 4)
//! ```

use crate::config::PipelineConfig;
use crate::document::{
    first_untitled, PipelineDocument, SchematizedSection, Section, SourceFile, Stage,
};
use crate::error::{PipelineError, Precondition, SchematizeError};
use crate::gateway::{StageGateway, StageInput, StageOutput};
use crate::view::ViewRequest;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Everything the controller tracks for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    /// Current stage (index 0..=4).
    pub stage: Stage,
    pub document: PipelineDocument,
    /// True while exactly one external call is outstanding.
    pub in_flight: bool,
    /// Failure of the most recent external call, cleared by a success.
    pub last_error: Option<PipelineError>,
    /// Furthest stage reachable with `advance` without resubmitting.
    reached: Stage,
    generation: u64,
}

impl PipelineState {
    pub fn stage_index(&self) -> usize {
        self.stage.index()
    }

    pub fn reached(&self) -> Stage {
        self.reached
    }

    /// Bumped by every `reset`; never decreases.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Caller-supplied data for a submission.
///
/// Fields left `None` are taken from the current document. Which overrides
/// a stage accepts:
///
/// | Stage | `source_file` | `structure` | `schematization` |
/// |-------|---------------|-------------|------------------|
/// | Upload | required | – | – |
/// | Structure | – | optional | – |
/// | Edit | – | – | optional (editable only) |
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub source_file: Option<SourceFile>,
    pub structure: Option<Vec<Section>>,
    pub schematization: Option<Vec<SchematizedSection>>,
}

impl Payload {
    /// Submit the document as it currently stands.
    pub fn current() -> Self {
        Self::default()
    }

    pub fn upload(source: SourceFile) -> Self {
        Self {
            source_file: Some(source),
            ..Self::default()
        }
    }

    pub fn with_structure(mut self, structure: Vec<Section>) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn with_schematization(mut self, schematization: Vec<SchematizedSection>) -> Self {
        self.schematization = Some(schematization);
        self
    }
}

/// Finite-state machine arbitrating every pipeline transition.
pub struct StepController {
    gateway: StageGateway,
    editable: bool,
    state: watch::Sender<PipelineState>,
}

impl std::fmt::Debug for StepController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepController")
            .field("gateway", &self.gateway)
            .field("editable", &self.editable)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl StepController {
    /// Build a controller and its gateway from config.
    pub fn new(config: &PipelineConfig) -> Result<Self, SchematizeError> {
        let gateway = StageGateway::from_config(config)?;
        Ok(Self::with_gateway(gateway, config.editable))
    }

    pub fn with_gateway(gateway: StageGateway, editable: bool) -> Self {
        let (state, _) = watch::channel(PipelineState::default());
        Self {
            gateway,
            editable,
            state,
        }
    }

    // ── Read access ──────────────────────────────────────────────────────

    /// Clone of the current state.
    pub fn snapshot(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn stage(&self) -> Stage {
        self.state.borrow().stage
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().in_flight
    }

    pub fn last_error(&self) -> Option<PipelineError> {
        self.state.borrow().last_error.clone()
    }

    pub fn document(&self) -> PipelineDocument {
        self.state.borrow().document.clone()
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Submit `stage` to its service and advance on success.
    ///
    /// Refused with [`PipelineError::PreconditionFailed`] (no call, no state
    /// change) when `stage` is not current, a call is in flight, or the
    /// payload does not fit the stage. A service failure is recorded in
    /// `last_error` and leaves the rest of the state untouched. Returns
    /// [`PipelineError::Superseded`] if the pipeline was reset meanwhile.
    pub async fn submit(
        &self,
        stage: Stage,
        payload: Payload,
    ) -> Result<PipelineDocument, PipelineError> {
        let (input, generation) = self.begin(stage, payload)?;
        let guard = InFlightGuard {
            state: &self.state,
            generation,
            armed: true,
        };

        let source = match input {
            StageInput::Upload(ref src) => Some(src.clone()),
            _ => None,
        };
        info!("Submitting {} (generation {})", input.stage(), generation);
        let outcome = self.gateway.invoke(input).await;
        guard.disarm();

        self.finish(stage, generation, source, outcome)
    }

    /// Move forward one stage reusing the cached output of the current one.
    pub fn advance(&self) -> Result<PipelineDocument, PipelineError> {
        let mut result: Result<PipelineDocument, PipelineError> =
            Err(Precondition::InFlight.into());
        self.state.send_if_modified(|state| {
            result = check_advance(state).map(|next| {
                state.stage = next;
                state.document.clone()
            });
            result.is_ok()
        });
        if let Err(ref e) = result {
            debug!("Advance refused: {}", e);
        }
        result
    }

    /// Step back one stage. No-op at Upload or while a call is in flight.
    ///
    /// Returns whether the stage changed. Document data is kept.
    pub fn retreat(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.in_flight {
                debug!("Retreat ignored: call in flight");
                return false;
            }
            match state.stage.prev() {
                Some(prev) => {
                    state.stage = prev;
                    true
                }
                None => false,
            }
        })
    }

    /// Discard everything and return to Upload, even mid-call.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            if state.in_flight {
                info!("Reset during {} call; its response will be discarded", state.stage);
            }
            *state = PipelineState {
                generation: state.generation + 1,
                ..PipelineState::default()
            };
        });
    }

    /// Carry out a request coming from a stage view.
    pub async fn dispatch(&self, request: ViewRequest) -> Result<PipelineDocument, PipelineError> {
        match request {
            ViewRequest::Submit { stage, payload } => self.submit(stage, payload).await,
            ViewRequest::Advance => self.advance(),
            ViewRequest::Retreat => {
                self.retreat();
                Ok(self.document())
            }
            ViewRequest::Reset => {
                self.reset();
                Ok(self.document())
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn begin(&self, stage: Stage, payload: Payload) -> Result<(StageInput, u64), PipelineError> {
        let editable = self.editable;
        let mut prepared: Result<(StageInput, u64), PipelineError> =
            Err(Precondition::InFlight.into());
        self.state.send_if_modified(|state| {
            prepared = prepare(state, stage, payload, editable).map(|input| {
                state.in_flight = true;
                (input, state.generation)
            });
            prepared.is_ok()
        });
        if let Err(ref e) = prepared {
            debug!("Submit of {} refused: {}", stage, e);
        }
        prepared
    }

    fn finish(
        &self,
        stage: Stage,
        generation: u64,
        source: Option<SourceFile>,
        outcome: Result<StageOutput, PipelineError>,
    ) -> Result<PipelineDocument, PipelineError> {
        let mut result: Result<PipelineDocument, PipelineError> =
            Err(PipelineError::Superseded { generation });
        self.state.send_if_modified(|state| {
            if state.generation != generation {
                warn!(
                    "Dropping stale {} response (generation {}, now {})",
                    stage, generation, state.generation
                );
                return false;
            }
            state.in_flight = false;
            result = outcome.and_then(|output| apply(state, stage, source, output));
            match result {
                Ok(_) => {
                    state.last_error = None;
                    info!("{} complete; now at {}", stage, state.stage);
                }
                Err(ref e) => {
                    warn!("{} failed: {}", stage, e);
                    state.last_error = Some(e.clone());
                }
            }
            true
        });
        result
    }
}

/// Releases `in_flight` if a submit future is dropped mid-call.
struct InFlightGuard<'a> {
    state: &'a watch::Sender<PipelineState>,
    generation: u64,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        self.state.send_if_modified(|state| {
            if state.generation == generation && state.in_flight {
                debug!("Submit abandoned; releasing in-flight flag");
                state.in_flight = false;
                true
            } else {
                false
            }
        });
    }
}

/// Validate a submission and build the gateway input.
fn prepare(
    state: &PipelineState,
    stage: Stage,
    payload: Payload,
    editable: bool,
) -> Result<StageInput, PipelineError> {
    if state.in_flight {
        return Err(Precondition::InFlight.into());
    }
    if stage != state.stage {
        return Err(Precondition::StageMismatch {
            requested: stage,
            current: state.stage,
        }
        .into());
    }

    let Payload {
        source_file,
        structure,
        schematization,
    } = payload;
    let unexpected = |field: &str| -> PipelineError {
        Precondition::UnexpectedPayload {
            stage,
            field: field.to_string(),
        }
        .into()
    };
    if source_file.is_some() && stage != Stage::Upload {
        return Err(unexpected("source_file"));
    }
    if structure.is_some() && stage != Stage::Structure {
        return Err(unexpected("structure"));
    }
    if let Some(ref edited) = schematization {
        if stage != Stage::Edit {
            return Err(unexpected("schematization"));
        }
        if !editable {
            return Err(Precondition::EditingDisabled.into());
        }
        if let Some(index) = first_untitled(edited) {
            return Err(Precondition::UntitledSection { index }.into());
        }
    }

    let doc = &state.document;
    let non_empty = |structure: Vec<Section>| -> Result<Vec<Section>, PipelineError> {
        if structure.is_empty() {
            Err(Precondition::EmptyStructure { stage }.into())
        } else {
            Ok(structure)
        }
    };

    let input = match stage {
        Stage::Upload => StageInput::Upload(source_file.ok_or(Precondition::MissingSource)?),
        Stage::Structure => StageInput::Structure {
            structure: non_empty(structure.unwrap_or_else(|| doc.structure.clone()))?,
        },
        Stage::Schematization => StageInput::Schematization {
            structure: non_empty(doc.structure.clone())?,
        },
        Stage::Edit => StageInput::Edit {
            structure: doc.structure.clone(),
            schematization: schematization.unwrap_or_else(|| doc.schematization.clone()),
        },
        Stage::Export => StageInput::Export {
            structure: doc.structure.clone(),
            schematization: doc.schematization.clone(),
        },
    };
    Ok(input)
}

/// Merge a successful reply into the state and move the stage forward.
fn apply(
    state: &mut PipelineState,
    stage: Stage,
    source: Option<SourceFile>,
    output: StageOutput,
) -> Result<PipelineDocument, PipelineError> {
    let doc = &mut state.document;
    match output {
        StageOutput::Extracted(structure) => {
            if structure.is_empty() {
                return Err(Precondition::EmptyStructure { stage }.into());
            }
            doc.source_file = source;
            doc.structure = structure;
        }
        StageOutput::Summarized(structure) => {
            if structure.is_empty() {
                return Err(Precondition::EmptyStructure { stage }.into());
            }
            doc.structure = structure;
        }
        StageOutput::Schematized(schematization) | StageOutput::Edited(schematization) => {
            doc.schematization = schematization;
        }
        StageOutput::Exported(export_ref) => {
            doc.export_ref = Some(export_ref);
        }
    }

    let next = stage.next().unwrap_or(stage);
    state.stage = next;
    state.reached = next;
    Ok(state.document.clone())
}

/// Target of `advance`, if permitted.
fn check_advance(state: &PipelineState) -> Result<Stage, PipelineError> {
    if state.in_flight {
        return Err(Precondition::InFlight.into());
    }
    if state.stage.is_terminal() {
        return Err(Precondition::Terminal { stage: state.stage }.into());
    }
    if state.stage >= state.reached {
        return Err(Precondition::NothingCached { stage: state.stage }.into());
    }
    if state.stage.requires_structure_to_leave() && state.document.structure.is_empty() {
        return Err(Precondition::EmptyStructure { stage: state.stage }.into());
    }
    Ok(state.stage.next().unwrap_or(state.stage))
}
