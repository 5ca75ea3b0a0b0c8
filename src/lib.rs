mod batch;
mod compose;
mod config;
mod error;
mod folder;
mod font;
mod glyph_report;
mod overlay;
mod pdfinspect;
mod progress;
mod record;
mod shaper;
mod store;
mod template;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use batch::{
    BatchResult, BatchRunner, BatchState, DeliveredArtifact, RecordFailure, run_batch,
};
pub use compose::{CertificateArtifact, DocumentCompositor};
pub use config::{
    AccessPolicy, BatchConfig, DEFAULT_FOLDER_NAME, DEFAULT_FONT_PATH, DEFAULT_LABEL_PREFIX,
    DriveConfig,
};
pub use error::{BatchError, RecordError, RecordStep, StoreError};
pub use folder::{FolderReference, FolderResolver};
pub use font::FontResource;
pub use glyph_report::{GlyphCoverageReport, MissingGlyph};
pub use overlay::{OverlayRenderer, TextOverlay};
pub use pdfinspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, composition_compatibility_issues,
    inspect_pdf_bytes, require_pdf_composition_compatibility,
};
pub use progress::{CollectingProgress, NullProgress, ProgressSink, ProgressTick, TracingProgress};
pub use record::{
    Record, fallback_label, records_from_csv, records_from_lines, records_from_names,
    records_from_xlsx,
};
pub use shaper::{DisplayText, TextShaper};
#[cfg(feature = "drive")]
pub use store::{DriveStore, read_access_token};
pub use store::{
    FOLDER_MIME_TYPE, MemoryStore, PDF_MIME_TYPE, RemoteFolder, RemoteStore, StoreCalls,
    StoredFile, StoredFolder,
};
pub use template::{Template, TemplateKind};
pub use types::{Color, Placement, Size};
