//! # schematize-pipeline
//!
//! Walk a law document through a fixed five-stage pipeline of external
//! processing services, with one controller owning all state.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 0. Upload          POST /extrair/       multipart → { structure }
//!  ├─ 1. Structure       POST /sumarizar/     { structure } → { summarized }
//!  ├─ 2. Schematization  POST /esquematizar/  { structure } → { schematization }
//!  ├─ 3. Edit            POST /editar/        { structure, schematization } → { edited }
//!  └─ 4. Export          POST /exportar/      { …, export_format } → { file_url }
//! ```
//!
//! The crate does none of the transformations itself. It decides when a
//! transition is allowed, carries the right payload into each call, and keeps
//! the state consistent when a call fails, overlaps, or arrives late.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use schematize_pipeline::{drive, AutoView, PipelineConfig, SourceFile, StepController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .base_url("http://localhost:8000")
//!         .build()?;
//!     let controller = StepController::new(&config)?;
//!     let source = SourceFile::resolve("lei_8112.pdf", config.download_timeout_secs).await?;
//!
//!     let document = drive(&controller, &mut AutoView::new(source)).await?;
//!     if let Some(url) = document.export_ref.and_then(|r| r.file_url) {
//!         println!("{url}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `schematize` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod gateway;
pub mod runner;
pub mod source;
pub mod view;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EndpointPaths, PipelineConfig, PipelineConfigBuilder};
pub use controller::{Payload, PipelineState, StepController};
pub use document::{
    DocumentSlice, ExportRef, PipelineDocument, SchematizedSection, Section, SourceFile, Stage,
};
pub use error::{PipelineError, Precondition, SchematizeError};
pub use gateway::{HttpTransport, StageGateway, StageInput, StageOutput, Transport, TransportError};
pub use runner::{drive, save_document, AutoView};
pub use view::{StageView, ViewRequest, ViewStatus};
