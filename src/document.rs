//! Data carried through the pipeline.
//!
//! A [`PipelineDocument`] accumulates the output of every stage. It starts
//! empty and is filled in stage by stage:
//!
//! ```text
//! Upload ──▶ Structure ──▶ Schematization ──▶ Edit ──▶ Export
//! source,    structure     schematization     schem.    export_ref
//! structure  (replaced)                       (replaced)
//! ```
//!
//! Only [`crate::controller::StepController`] mutates it; everything else
//! gets clones or borrowed [`DocumentSlice`]s.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ── Stages ───────────────────────────────────────────────────────────────

/// One step of the fixed five-stage pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Send the raw document to the extraction service.
    #[default]
    Upload,
    /// Reorganize the extracted structure.
    Structure,
    /// Generate a schematization per section.
    Schematization,
    /// Persist the user's edits to the schematization.
    Edit,
    /// Produce the final artifact.
    Export,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Structure,
        Stage::Schematization,
        Stage::Edit,
        Stage::Export,
    ];

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stage at a zero-based position, if any.
    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    /// The stage after this one, or `None` at Export.
    pub fn next(self) -> Option<Stage> {
        Self::from_index(self.index() + 1)
    }

    /// The stage before this one, or `None` at Upload.
    pub fn prev(self) -> Option<Stage> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Export
    }

    /// Whether leaving this stage requires a non-empty structure.
    pub fn requires_structure_to_leave(self) -> bool {
        matches!(self, Stage::Upload | Stage::Structure)
    }

    /// Short title for steppers and progress output.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Upload => "PDF",
            Stage::Structure => "Structure",
            Stage::Schematization => "Schematize",
            Stage::Edit => "Edit",
            Stage::Export => "Export",
        }
    }

    /// One-line description of what the user does at this stage.
    pub fn description(self) -> &'static str {
        match self {
            Stage::Upload => "Upload the law PDF",
            Stage::Structure => "Review the extracted structure",
            Stage::Schematization => "Organize and highlight with AI",
            Stage::Edit => "Add questions and comments",
            Stage::Export => "Download the final PDF",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Upload => "Upload",
            Stage::Structure => "Structure",
            Stage::Schematization => "Schematization",
            Stage::Edit => "Edit",
            Stage::Export => "Export",
        };
        f.write_str(name)
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// A titled slice of the document, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

impl Section {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// The schematization generated for one section.
///
/// The title normally matches a [`Section`] title, but a service may rename
/// or merge sections, so nothing enforces the correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchematizedSection {
    pub title: String,
    pub schematization: String,
}

impl SchematizedSection {
    pub fn new(title: impl Into<String>, schematization: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            schematization: schematization.into(),
        }
    }
}

/// Index of the first schematized section whose title is blank.
pub fn first_untitled(sections: &[SchematizedSection]) -> Option<usize> {
    sections.iter().position(|s| s.title.trim().is_empty())
}

// ── Source and export handles ────────────────────────────────────────────

/// The originally uploaded document.
///
/// Bytes are shared behind an `Arc`, so cloning the handle (and therefore
/// the whole [`PipelineDocument`]) never copies the file. Serialises as
/// name, MIME type and size only.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    file_name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    /// Wrap in-memory bytes without validation.
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: "application/pdf".to_string(),
            bytes: bytes.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Serialize for SourceFile {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("SourceFile", 3)?;
        s.serialize_field("file_name", &self.file_name)?;
        s.serialize_field("mime_type", &self.mime_type)?;
        s.serialize_field("size", &self.bytes.len())?;
        s.end()
    }
}

/// Reference to the exported artifact.
///
/// The export service may answer without a URL; that still counts as a
/// completed export, so `file_url` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRef {
    pub file_url: Option<String>,
    pub format: String,
}

// ── Aggregate ────────────────────────────────────────────────────────────

/// Everything the pipeline has produced so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineDocument {
    pub source_file: Option<SourceFile>,
    pub structure: Vec<Section>,
    pub schematization: Vec<SchematizedSection>,
    pub export_ref: Option<ExportRef>,
}

impl PipelineDocument {
    /// Borrow the part of the document a stage works on.
    pub fn slice_for(&self, stage: Stage, editable: bool) -> DocumentSlice<'_> {
        match stage {
            Stage::Upload => DocumentSlice::Upload {
                source_file: self.source_file.as_ref(),
            },
            Stage::Structure => DocumentSlice::Structure {
                structure: &self.structure,
            },
            Stage::Schematization => DocumentSlice::Schematization {
                structure: &self.structure,
            },
            Stage::Edit => DocumentSlice::Edit {
                structure: &self.structure,
                schematization: &self.schematization,
                editable,
            },
            Stage::Export => DocumentSlice::Export {
                structure: &self.structure,
                schematization: &self.schematization,
                export_ref: self.export_ref.as_ref(),
            },
        }
    }
}

/// Read-only view of the document fields relevant to one stage.
#[derive(Debug, Clone, Copy)]
pub enum DocumentSlice<'a> {
    Upload {
        source_file: Option<&'a SourceFile>,
    },
    Structure {
        structure: &'a [Section],
    },
    Schematization {
        structure: &'a [Section],
    },
    Edit {
        structure: &'a [Section],
        schematization: &'a [SchematizedSection],
        editable: bool,
    },
    Export {
        structure: &'a [Section],
        schematization: &'a [SchematizedSection],
        export_ref: Option<&'a ExportRef>,
    },
}

impl DocumentSlice<'_> {
    pub fn stage(&self) -> Stage {
        match self {
            DocumentSlice::Upload { .. } => Stage::Upload,
            DocumentSlice::Structure { .. } => Stage::Structure,
            DocumentSlice::Schematization { .. } => Stage::Schematization,
            DocumentSlice::Edit { .. } => Stage::Edit,
            DocumentSlice::Export { .. } => Stage::Export,
        }
    }
}
