//! Integration tests for the step controller.
//!
//! The processing services are replaced by [`Service`], an in-process
//! transport that answers like a well-behaved backend unless a reply was
//! queued for an endpoint. Calls can be held at a gate to observe the
//! controller while a request is outstanding.

use futures::future::{BoxFuture, FutureExt};
use schematize_pipeline::{
    drive, AutoView, Payload, PipelineConfig, PipelineError, Precondition, SchematizedSection,
    Section, SourceFile, Stage, StepController, Transport, TransportError, ViewRequest,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

const EXPORTED_URL: &str = "https://files.example/lei_8112.pdf";

// ── Test service ─────────────────────────────────────────────────────────

struct Service {
    queued: Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
    gate: Option<Semaphore>,
}

impl Service {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    /// Every call waits for [`Service::release`].
    fn gated() -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
        })
    }

    fn queue(&self, endpoint: &str, reply: Result<Value, TransportError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
    }

    fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(1);
        }
    }

    fn calls_to(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn answer(&self, endpoint: &str, body: Value) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), body.clone()));
        if let Some(ref gate) = self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(|q| q.pop_front());
        match queued {
            Some(reply) => reply,
            None => Ok(well_behaved(endpoint, &body)),
        }
    }
}

/// What a working backend answers.
fn well_behaved(endpoint: &str, body: &Value) -> Value {
    match endpoint {
        "/extrair/" => json!({
            "structure": [
                { "title": "Art. 1", "content": "Esta Lei institui o regime jurídico." },
                { "title": "Art. 2", "content": "Servidor é a pessoa legalmente investida." }
            ]
        }),
        "/sumarizar/" => json!({ "summarized": body["structure"] }),
        "/esquematizar/" => {
            let entries: Vec<Value> = body["structure"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|s| {
                    json!({
                        "title": s["title"],
                        "schematization": format!("esquema: {}", s["title"])
                    })
                })
                .collect();
            json!({ "schematization": entries })
        }
        "/editar/" => json!({ "edited": body["schematization"] }),
        "/exportar/" => json!({ "file_url": EXPORTED_URL }),
        other => panic!("unexpected endpoint {other}"),
    }
}

impl Transport for Service {
    fn post_json<'a>(
        &'a self,
        endpoint: &'a str,
        body: Value,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        self.answer(endpoint, body).boxed()
    }

    fn post_file<'a>(
        &'a self,
        endpoint: &'a str,
        field: &'a str,
        file: &'a SourceFile,
    ) -> BoxFuture<'a, Result<Value, TransportError>> {
        let body = json!({
            "field": field,
            "file_name": file.file_name(),
            "size": file.len()
        });
        self.answer(endpoint, body).boxed()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn controller(service: &Arc<Service>) -> StepController {
    controller_with(service, true)
}

fn controller_with(service: &Arc<Service>, editable: bool) -> StepController {
    init_tracing();
    let transport: Arc<dyn Transport> = service.clone();
    let config = PipelineConfig::builder()
        .transport(transport)
        .editable(editable)
        .build()
        .unwrap();
    StepController::new(&config).unwrap()
}

/// Set `RUST_LOG=schematize_pipeline=debug` to see controller logs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pdf() -> SourceFile {
    SourceFile::from_bytes("lei_8112.pdf", b"%PDF-1.7\n%fake".to_vec())
}

/// Submit every stage before `target` with the current document.
async fn walk_to(controller: &StepController, target: Stage) {
    while controller.stage() < target {
        let stage = controller.stage();
        let payload = if stage == Stage::Upload {
            Payload::upload(pdf())
        } else {
            Payload::current()
        };
        controller.submit(stage, payload).await.unwrap();
    }
}

async fn wait_in_flight(controller: &StepController) {
    while !controller.is_in_flight() {
        tokio::task::yield_now().await;
    }
}

fn unreachable_reply() -> Result<Value, TransportError> {
    Err(TransportError::Unreachable {
        reason: "connection refused".into(),
    })
}

// ── Stage walk ───────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_records_extracted_structure() {
    let service = Service::new();
    service.queue(
        "/extrair/",
        Ok(json!({ "structure": [{ "title": "Art. 1", "content": "..." }] })),
    );
    let controller = controller(&service);

    let doc = controller
        .submit(Stage::Upload, Payload::upload(pdf()))
        .await
        .unwrap();

    let state = controller.snapshot();
    assert_eq!(state.stage_index(), 1);
    assert_eq!(doc.structure, vec![Section::new("Art. 1", "...")]);
    assert_eq!(
        state.document.source_file.as_ref().map(|s| s.file_name()),
        Some("lei_8112.pdf")
    );
    assert!(state.last_error.is_none());

    let sent = service.calls_to("/extrair/");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["field"], "pdf");
}

#[tokio::test]
async fn full_walk_reaches_export() {
    let service = Service::new();
    let controller = controller(&service);

    walk_to(&controller, Stage::Export).await;
    let doc = assert_ok!(controller.submit(Stage::Export, Payload::current()).await);

    assert_eq!(controller.stage(), Stage::Export);
    assert_eq!(doc.structure.len(), 2);
    assert_eq!(doc.schematization.len(), 2);
    assert_eq!(doc.schematization[0].title, "Art. 1");
    let export_ref = doc.export_ref.unwrap();
    assert_eq!(export_ref.file_url.as_deref(), Some(EXPORTED_URL));
    assert_eq!(export_ref.format, "pdf");

    let endpoints: Vec<String> = service
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(e, _)| e.clone())
        .collect();
    assert_eq!(
        endpoints,
        ["/extrair/", "/sumarizar/", "/esquematizar/", "/editar/", "/exportar/"]
    );

    let export_body = &service.calls_to("/exportar/")[0];
    assert_eq!(export_body["export_format"], "pdf");
    assert_eq!(export_body["schematization"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn schematization_failure_keeps_stage() {
    let service = Service::new();
    service.queue("/esquematizar/", unreachable_reply());
    let controller = controller(&service);
    walk_to(&controller, Stage::Schematization).await;

    let err = controller
        .submit(Stage::Schematization, Payload::current())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ServiceUnreachable {
            stage: Stage::Schematization,
            ..
        }
    ));
    let state = controller.snapshot();
    assert_eq!(state.stage_index(), 2);
    assert_eq!(state.last_error, Some(err));
    assert!(state.document.schematization.is_empty());
    assert!(!state.in_flight);

    // A later success clears the error.
    controller
        .submit(Stage::Schematization, Payload::current())
        .await
        .unwrap();
    assert_eq!(controller.stage(), Stage::Edit);
    assert!(controller.last_error().is_none());
}

#[tokio::test]
async fn edit_without_edited_field_keeps_submission() {
    let service = Service::new();
    service.queue("/editar/", Ok(json!({})));
    let controller = controller(&service);
    walk_to(&controller, Stage::Edit).await;

    let mine = vec![
        SchematizedSection::new("Art. 1", "meu esquema"),
        SchematizedSection::new("Art. 2", "outro"),
    ];
    let doc = controller
        .submit(
            Stage::Edit,
            Payload::current().with_schematization(mine.clone()),
        )
        .await
        .unwrap();

    assert_eq!(controller.snapshot().stage_index(), 4);
    assert_eq!(doc.schematization, mine);
    assert_eq!(
        service.calls_to("/editar/")[0]["schematization"][0]["schematization"],
        "meu esquema"
    );
}

#[tokio::test]
async fn export_is_terminal() {
    let service = Service::new();
    service.queue("/exportar/", Ok(json!({ "file_url": "https://x/y.pdf" })));
    let controller = controller(&service);
    walk_to(&controller, Stage::Export).await;

    let doc = controller
        .submit(Stage::Export, Payload::current())
        .await
        .unwrap();
    assert_eq!(
        doc.export_ref.and_then(|r| r.file_url).as_deref(),
        Some("https://x/y.pdf")
    );

    assert_eq!(
        controller.advance(),
        Err(PipelineError::from(Precondition::Terminal {
            stage: Stage::Export
        }))
    );
    assert_eq!(controller.snapshot().stage_index(), 4);

    // Export may be repeated.
    controller
        .submit(Stage::Export, Payload::current())
        .await
        .unwrap();
    assert_eq!(service.calls_to("/exportar/").len(), 2);
    assert_eq!(controller.stage(), Stage::Export);
}

#[tokio::test]
async fn export_without_url_still_succeeds() {
    let service = Service::new();
    service.queue("/exportar/", Ok(json!({ "file_url": null })));
    let controller = controller(&service);
    walk_to(&controller, Stage::Export).await;

    let doc = controller
        .submit(Stage::Export, Payload::current())
        .await
        .unwrap();
    let export_ref = doc.export_ref.unwrap();
    assert!(export_ref.file_url.is_none());
    assert!(controller.last_error().is_none());
}

#[tokio::test]
async fn summarize_without_field_keeps_structure() {
    let service = Service::new();
    service.queue("/sumarizar/", Ok(json!({ "status": "ok" })));
    let controller = controller(&service);
    walk_to(&controller, Stage::Structure).await;
    let before = controller.document().structure;

    let doc = controller
        .submit(Stage::Structure, Payload::current())
        .await
        .unwrap();
    assert_eq!(doc.structure, before);
    assert_eq!(controller.stage(), Stage::Schematization);
}

#[tokio::test]
async fn structure_override_is_sent() {
    let service = Service::new();
    let controller = controller(&service);
    walk_to(&controller, Stage::Structure).await;

    let trimmed = vec![Section::new("Art. 2", "só este")];
    let doc = controller
        .submit(
            Stage::Structure,
            Payload::current().with_structure(trimmed.clone()),
        )
        .await
        .unwrap();

    assert_eq!(doc.structure, trimmed);
    assert_eq!(
        service.calls_to("/sumarizar/")[0]["structure"][0]["title"],
        "Art. 2"
    );
}

// ── Failures and preconditions ───────────────────────────────────────────

#[tokio::test]
async fn empty_extraction_is_refused() {
    let service = Service::new();
    service.queue("/extrair/", Ok(json!({ "structure": [] })));
    let controller = controller(&service);

    let err = controller
        .submit(Stage::Upload, Payload::upload(pdf()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PipelineError::from(Precondition::EmptyStructure {
            stage: Stage::Upload
        })
    );
    let state = controller.snapshot();
    assert_eq!(state.stage, Stage::Upload);
    assert!(state.document.source_file.is_none());
    assert_eq!(state.last_error, Some(err));
}

#[tokio::test]
async fn malformed_schematization_is_recorded() {
    let service = Service::new();
    service.queue(
        "/esquematizar/",
        Ok(json!({ "schematization": [{ "title": "", "schematization": "x" }] })),
    );
    let controller = controller(&service);
    walk_to(&controller, Stage::Schematization).await;

    let err = controller
        .submit(Stage::Schematization, Payload::current())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MalformedResponse {
            stage: Stage::Schematization,
            ..
        }
    ));
    assert!(err.is_recoverable());
    assert_eq!(controller.stage(), Stage::Schematization);
    assert_eq!(controller.last_error(), Some(err));
}

#[tokio::test]
async fn preconditions_make_no_call() {
    let service = Service::new();
    let controller = controller(&service);
    let before = controller.snapshot();

    let err = assert_err!(controller.submit(Stage::Structure, Payload::current()).await);
    assert_eq!(
        err,
        PipelineError::from(Precondition::StageMismatch {
            requested: Stage::Structure,
            current: Stage::Upload
        })
    );

    let err = controller
        .submit(Stage::Upload, Payload::current())
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::from(Precondition::MissingSource));

    let err = controller
        .submit(
            Stage::Upload,
            Payload::upload(pdf()).with_structure(vec![Section::new("Art. 1", "x")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::PreconditionFailed(Precondition::UnexpectedPayload { .. })
    ));

    assert_eq!(service.call_count(), 0);
    assert_eq!(controller.snapshot(), before);
}

#[tokio::test]
async fn empty_structure_override_is_refused() {
    let service = Service::new();
    let controller = controller(&service);
    walk_to(&controller, Stage::Structure).await;
    let calls = service.call_count();

    let err = controller
        .submit(Stage::Structure, Payload::current().with_structure(vec![]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PipelineError::from(Precondition::EmptyStructure {
            stage: Stage::Structure
        })
    );
    assert_eq!(service.call_count(), calls);
    assert!(controller.last_error().is_none());
}

#[tokio::test]
async fn read_only_edit_submits_generated_schematization() {
    let service = Service::new();
    let controller = controller_with(&service, false);
    walk_to(&controller, Stage::Edit).await;
    let generated = controller.document().schematization;

    let err = controller
        .submit(
            Stage::Edit,
            Payload::current().with_schematization(vec![SchematizedSection::new("Art. 1", "x")]),
        )
        .await
        .unwrap_err();
    assert_eq!(err, PipelineError::from(Precondition::EditingDisabled));
    assert!(service.calls_to("/editar/").is_empty());

    let doc = controller
        .submit(Stage::Edit, Payload::current())
        .await
        .unwrap();
    assert_eq!(doc.schematization, generated);
}

// ── Concurrency ──────────────────────────────────────────────────────────

#[tokio::test]
async fn single_flight() {
    let service = Service::gated();
    let controller = controller(&service);

    let (first, second) = tokio::join!(
        controller.submit(Stage::Upload, Payload::upload(pdf())),
        async {
            wait_in_flight(&controller).await;
            let second = controller
                .submit(Stage::Upload, Payload::upload(pdf()))
                .await;
            assert!(!controller.retreat());
            assert_eq!(
                controller.advance(),
                Err(PipelineError::from(Precondition::InFlight))
            );
            service.release();
            second
        }
    );

    assert!(first.is_ok());
    assert_eq!(second, Err(PipelineError::from(Precondition::InFlight)));
    assert_eq!(service.calls_to("/extrair/").len(), 1);
    assert!(!controller.is_in_flight());
    assert_eq!(controller.stage(), Stage::Structure);
}

#[tokio::test]
async fn reset_discards_late_response() {
    let service = Service::gated();
    let controller = controller(&service);

    let (outcome, ()) = tokio::join!(
        controller.submit(Stage::Upload, Payload::upload(pdf())),
        async {
            wait_in_flight(&controller).await;
            controller.reset();
            service.release();
        }
    );

    assert_eq!(outcome, Err(PipelineError::Superseded { generation: 0 }));
    let state = controller.snapshot();
    assert_eq!(state.stage, Stage::Upload);
    assert!(state.document.structure.is_empty());
    assert!(state.document.source_file.is_none());
    assert!(state.last_error.is_none());
    assert!(!state.in_flight);
    assert_eq!(state.generation(), 1);
}

#[tokio::test]
async fn late_failure_after_reset_is_not_recorded() {
    let service = Service::gated();
    service.queue("/extrair/", unreachable_reply());
    let controller = controller(&service);

    let (outcome, ()) = tokio::join!(
        controller.submit(Stage::Upload, Payload::upload(pdf())),
        async {
            wait_in_flight(&controller).await;
            controller.reset();
            service.release();
        }
    );

    assert_eq!(outcome, Err(PipelineError::Superseded { generation: 0 }));
    let state = controller.snapshot();
    assert!(state.last_error.is_none());
    assert!(!state.in_flight);
    assert_eq!(state.stage, Stage::Upload);
}

#[tokio::test]
async fn late_reply_leaves_newer_call_in_flight() {
    let service = Service::gated();
    service.queue("/extrair/", unreachable_reply());
    let controller = controller(&service);
    let old_done = AtomicBool::new(false);

    let (old, new) = tokio::join!(
        async {
            let outcome = controller
                .submit(Stage::Upload, Payload::upload(pdf()))
                .await;
            old_done.store(true, Ordering::SeqCst);
            outcome
        },
        async {
            wait_in_flight(&controller).await;
            controller.reset();
            assert!(!controller.is_in_flight());

            let (new, ()) = tokio::join!(
                controller.submit(Stage::Upload, Payload::upload(pdf())),
                async {
                    wait_in_flight(&controller).await;
                    // The semaphore is fair: the first permit goes to the old call.
                    service.release();
                    while !old_done.load(Ordering::SeqCst) {
                        tokio::task::yield_now().await;
                    }
                    let state = controller.snapshot();
                    assert!(state.in_flight);
                    assert!(state.last_error.is_none());
                    service.release();
                }
            );
            new
        }
    );

    assert_eq!(old, Err(PipelineError::Superseded { generation: 0 }));
    assert!(new.is_ok());
    let state = controller.snapshot();
    assert_eq!(state.stage, Stage::Structure);
    assert!(state.last_error.is_none());
    assert!(!state.in_flight);
    assert_eq!(state.generation(), 1);
}

#[tokio::test]
async fn dropped_submit_releases_flag() {
    let service = Service::gated();
    let controller = controller(&service);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        controller.submit(Stage::Upload, Payload::upload(pdf())),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(!controller.is_in_flight());
    assert_eq!(controller.stage(), Stage::Upload);

    service.release();
    controller
        .submit(Stage::Upload, Payload::upload(pdf()))
        .await
        .unwrap();
    assert_eq!(controller.stage(), Stage::Structure);
}

#[tokio::test]
async fn subscribers_see_transitions() {
    let service = Service::new();
    let controller = controller(&service);
    let mut rx = controller.subscribe();

    controller
        .submit(Stage::Upload, Payload::upload(pdf()))
        .await
        .unwrap();

    assert!(rx.has_changed().unwrap());
    let seen = rx.borrow_and_update().clone();
    assert_eq!(seen.stage, Stage::Structure);
    assert!(!seen.in_flight);

    // Refused requests do not notify.
    let _ = controller.advance();
    assert!(!rx.has_changed().unwrap());
}

// ── Navigation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn retreat_keeps_data_and_advance_reuses_it() {
    let service = Service::new();
    let controller = controller(&service);
    walk_to(&controller, Stage::Edit).await;
    let doc = controller.document();
    let calls = service.call_count();

    assert!(controller.retreat());
    assert!(controller.retreat());
    assert_eq!(controller.stage(), Stage::Structure);
    assert_eq!(controller.document(), doc);

    controller.advance().unwrap();
    controller.advance().unwrap();
    assert_eq!(controller.stage(), Stage::Edit);
    assert_eq!(
        controller.advance(),
        Err(PipelineError::from(Precondition::NothingCached {
            stage: Stage::Edit
        }))
    );
    assert_eq!(service.call_count(), calls);
}

#[tokio::test]
async fn retreat_after_export_keeps_everything() {
    let service = Service::new();
    let controller = controller(&service);
    walk_to(&controller, Stage::Export).await;
    let exported = controller
        .submit(Stage::Export, Payload::current())
        .await
        .unwrap();
    assert!(exported.export_ref.is_some());

    assert!(controller.retreat());
    assert_eq!(controller.stage(), Stage::Edit);

    let doc = controller.document();
    assert_eq!(doc.export_ref, exported.export_ref);
    assert_eq!(doc.structure, exported.structure);
    assert_eq!(doc.schematization, exported.schematization);
    assert_eq!(doc, exported);
}

#[tokio::test]
async fn retreat_stops_at_upload() {
    let service = Service::new();
    let controller = controller(&service);
    assert!(!controller.retreat());
    assert_eq!(controller.stage(), Stage::Upload);
}

#[tokio::test]
async fn resubmitting_after_retreat_limits_reach() {
    let service = Service::new();
    let controller = controller(&service);
    walk_to(&controller, Stage::Export).await;

    controller.retreat();
    controller.retreat();
    controller.retreat();
    assert_eq!(controller.stage(), Stage::Structure);
    controller
        .submit(Stage::Structure, Payload::current())
        .await
        .unwrap();

    assert_eq!(controller.snapshot().reached(), Stage::Schematization);
    assert!(controller.advance().is_err());
}

#[tokio::test]
async fn dispatch_routes_requests() {
    let service = Service::new();
    let controller = controller(&service);

    controller
        .dispatch(ViewRequest::submit(Stage::Upload, Payload::upload(pdf())))
        .await
        .unwrap();
    assert_eq!(controller.stage(), Stage::Structure);

    controller.dispatch(ViewRequest::Retreat).await.unwrap();
    assert_eq!(controller.stage(), Stage::Upload);

    controller.dispatch(ViewRequest::Advance).await.unwrap();
    assert_eq!(controller.stage(), Stage::Structure);

    let doc = controller.dispatch(ViewRequest::Reset).await.unwrap();
    assert!(doc.structure.is_empty());
    assert_eq!(controller.stage(), Stage::Upload);
    assert_eq!(controller.snapshot().generation(), 1);
}

// ── Driver ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn drive_runs_every_stage() {
    let service = Service::new();
    let controller = controller(&service);
    let mut view = AutoView::new(pdf());

    let doc = drive(&controller, &mut view).await.unwrap();

    assert_eq!(
        doc.export_ref.and_then(|r| r.file_url).as_deref(),
        Some(EXPORTED_URL)
    );
    assert_eq!(service.call_count(), 5);
    assert!(!view.gave_up());
}

#[tokio::test]
async fn drive_submits_edits() {
    let service = Service::new();
    let controller = controller(&service);
    let edits = vec![SchematizedSection::new("Art. 1", "revisado")];
    let mut view = AutoView::new(pdf()).with_edits(edits.clone());

    let doc = drive(&controller, &mut view).await.unwrap();

    assert_eq!(doc.schematization, edits);
    assert_eq!(
        service.calls_to("/exportar/")[0]["schematization"][0]["schematization"],
        "revisado"
    );
}

#[tokio::test]
async fn drive_retries_transient_failures() {
    let service = Service::new();
    service.queue("/esquematizar/", unreachable_reply());
    let controller = controller(&service);
    let mut view = AutoView::new(pdf()).retry_backoff_ms(1);

    let doc = drive(&controller, &mut view).await.unwrap();

    assert_eq!(service.calls_to("/esquematizar/").len(), 2);
    assert!(doc.export_ref.is_some());
}

#[tokio::test]
async fn drive_gives_up_after_max_attempts() {
    let service = Service::new();
    for _ in 0..3 {
        service.queue("/sumarizar/", unreachable_reply());
    }
    let controller = controller(&service);
    let mut view = AutoView::new(pdf()).max_attempts(2).retry_backoff_ms(0);

    let err = drive(&controller, &mut view).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ServiceUnreachable {
            stage: Stage::Structure,
            ..
        }
    ));
    assert!(view.gave_up());
    assert_eq!(service.calls_to("/sumarizar/").len(), 2);
    assert_eq!(controller.stage(), Stage::Structure);
}
