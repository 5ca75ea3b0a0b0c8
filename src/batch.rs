use crate::compose::{CertificateArtifact, DocumentCompositor};
use crate::config::BatchConfig;
use crate::error::{BatchError, RecordError, RecordStep};
use crate::folder::{FolderReference, FolderResolver};
use crate::font::FontResource;
use crate::glyph_report::GlyphCoverageReport;
use crate::overlay::OverlayRenderer;
use crate::progress::{ProgressSink, ProgressTick};
use crate::record::Record;
use crate::shaper::TextShaper;
use crate::store::{PDF_MIME_TYPE, RemoteStore};
use crate::template::Template;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Resolving,
    PerRecordLoop,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveredArtifact {
    pub index: usize,
    pub file_name: String,
    pub file_id: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub reason: String,
}

/// Outcome of one batch. Delivered and failed entries are in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub processed: usize,
    pub delivered: Vec<DeliveredArtifact>,
    pub failed: Vec<RecordFailure>,
    pub folder: Option<FolderReference>,
    /// Set when the batch stopped before its record loop.
    pub aborted: Option<String>,
    pub missing_glyphs: GlyphCoverageReport,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.delivered.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.index).collect()
    }

    /// Nothing aborted and nothing failed.
    pub fn is_complete_success(&self) -> bool {
        self.aborted.is_none() && self.failed.is_empty()
    }
}

/// Drives shape, render, compose and deliver for every record of one batch.
/// `run` consumes the runner; a new batch needs a new runner.
pub struct BatchRunner<'a> {
    store: &'a dyn RemoteStore,
    config: BatchConfig,
    template: Template,
    shaper: TextShaper,
    renderer: OverlayRenderer,
    compositor: DocumentCompositor,
    state: BatchState,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        store: &'a dyn RemoteStore,
        config: BatchConfig,
        template: Template,
        font: FontResource,
    ) -> Self {
        Self {
            store,
            config,
            template,
            shaper: TextShaper::new(),
            renderer: OverlayRenderer::new(font),
            compositor: DocumentCompositor::new(),
            state: BatchState::Idle,
        }
    }

    pub fn with_shaper(mut self, shaper: TextShaper) -> Self {
        self.shaper = shaper;
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn run(
        mut self,
        records: &[Record],
        progress: &mut dyn ProgressSink,
    ) -> Result<BatchResult, BatchError> {
        self.config.validate()?;
        if records.is_empty() {
            return Err(BatchError::configuration("no records to process"));
        }

        let span = info_span!(
            "batch",
            folder = %self.config.folder_name,
            records = records.len()
        );
        let _batch = span.enter();

        let mut result = BatchResult {
            total: records.len(),
            ..BatchResult::default()
        };

        self.transition(BatchState::Resolving);
        let resolver =
            FolderResolver::new(self.store).with_policy(self.config.access.clone());
        let folder = match resolver.resolve(&self.config.folder_name) {
            Ok(folder) => folder,
            Err(err) => {
                error!(error = %err, "folder resolution failed; batch aborted");
                result.aborted = Some(format!("folder resolution failed: {err}"));
                self.transition(BatchState::Finalized);
                progress.finish(&result);
                return Ok(result);
            }
        };
        info!(folder = %folder.name, id = %folder.id, "destination folder ready");
        result.folder = Some(folder.clone());

        self.transition(BatchState::PerRecordLoop);
        let total = records.len();
        for (position, record) in records.iter().enumerate() {
            let _record = info_span!("record", index = record.index).entered();
            match self.process_record(record, &folder, &mut result.missing_glyphs) {
                Ok(delivered) => {
                    info!(file = %delivered.file_name, id = %delivered.file_id, "uploaded");
                    result.delivered.push(delivered);
                }
                Err(err) => {
                    let reason = format!(
                        "record {} ({}): {}",
                        record.index, record.display_name, err
                    );
                    warn!(%reason, "record failed");
                    result.failed.push(RecordFailure {
                        index: record.index,
                        reason,
                    });
                }
            }
            result.processed += 1;

            let tick = ProgressTick {
                current: position + 1,
                total,
            };
            if tick.is_due(self.config.progress_every) {
                progress.tick(tick);
            }
        }

        self.transition(BatchState::Finalized);
        if !result.missing_glyphs.is_empty() {
            warn!(
                missing = %result.missing_glyphs.summary(),
                "some characters were not drawn"
            );
        }
        info!(
            succeeded = result.succeeded(),
            failed = result.failed_count(),
            "batch complete"
        );
        progress.finish(&result);
        Ok(result)
    }

    fn process_record(
        &self,
        record: &Record,
        folder: &FolderReference,
        coverage: &mut GlyphCoverageReport,
    ) -> Result<DeliveredArtifact, RecordError> {
        let shaped = self.shaper.shape(&record.display_name);
        debug!(visual = %shaped, "shaped");

        let overlay = self
            .renderer
            .render(&shaped, self.template.page_size(), self.config.placement)
            .map_err(|err| {
                let step = match &err {
                    BatchError::Shaping(_) => RecordStep::Shape,
                    _ => RecordStep::Render,
                };
                RecordError::new(step, err)
            })?;
        coverage.merge(overlay.coverage);

        let bytes = self
            .compositor
            .compose(self.template.bytes(), &overlay.bytes)
            .map_err(|err| RecordError::new(RecordStep::Compose, err))?;
        let artifact = CertificateArtifact::new(
            self.config.artifact_file_name(&record.display_name),
            bytes,
        );
        debug!(file = %artifact.file_name, sha256 = %artifact.sha256, "composed");

        let file_id = self
            .store
            .create_file(&artifact.file_name, &folder.id, PDF_MIME_TYPE, &artifact.bytes)
            .map_err(|err| RecordError::new(RecordStep::Deliver, err))?;

        Ok(DeliveredArtifact {
            index: record.index,
            file_name: artifact.file_name,
            file_id,
            sha256: artifact.sha256,
        })
    }

    fn transition(&mut self, next: BatchState) {
        debug!(from = ?self.state, to = ?next, "batch state");
        self.state = next;
    }
}

/// Loads the font and template named by `config`, then runs one batch. The
/// font is loaded first, so a missing font aborts before the store is
/// touched.
pub fn run_batch(
    config: &BatchConfig,
    store: &dyn RemoteStore,
    template_path: &Path,
    records: &[Record],
    progress: &mut dyn ProgressSink,
) -> Result<BatchResult, BatchError> {
    config.validate()?;
    let font = FontResource::load(&config.font_path)?;
    let template = Template::load(template_path, config.raster_page)?;
    debug!(font = font.name(), "batch resources loaded");
    BatchRunner::new(store, config.clone(), template, font).run(records, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CollectingProgress, NullProgress};
    use crate::record::records_from_names;
    use crate::store::MemoryStore;
    use crate::testing::{png_bytes, template_pdf, tiny_font, tiny_font_bytes};
    use crate::types::Size;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn pdf_template() -> Template {
        Template::from_pdf(template_pdf(842, 595, 1)).unwrap()
    }

    fn runner(store: &MemoryStore) -> BatchRunner<'_> {
        BatchRunner::new(store, BatchConfig::default(), pdf_template(), tiny_font())
    }

    #[test]
    fn end_to_end_creates_folder_and_names_artifacts() {
        let store = MemoryStore::new();
        let records = records_from_names(["Aya", "محمد", ""]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();

        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.failed_count(), 0);
        assert_eq!(store.calls().create_folder, 1);
        let names: Vec<String> = store.files().into_iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "Certificate Aya.pdf",
                "Certificate محمد.pdf",
                "Certificate user-3.pdf"
            ]
        );
        let folder = result.folder.unwrap();
        assert_eq!(folder.name, "Certificates");
        assert!(store.files().iter().all(|f| f.parent_id == folder.id));
        assert!(store.files().iter().all(|f| f.mime_type == "application/pdf"));
    }

    #[test]
    fn counts_always_add_up() {
        let store = MemoryStore::new().failing_upload_at(0).failing_upload_at(2);
        let records = records_from_names(["a", "b", "c", "d"]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();
        assert_eq!(result.delivered.len() + result.failed.len(), records.len());
        assert_eq!(result.processed, 4);
        assert_eq!(result.total, 4);
    }

    #[test]
    fn failure_at_record_three_does_not_stop_the_rest() {
        let store = MemoryStore::new().failing_upload_at(3);
        let records = records_from_names(["a", "b", "c", "d", "e", "f"]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();
        assert_eq!(result.failed_indices(), vec![3]);
        let delivered: Vec<usize> = result.delivered.iter().map(|d| d.index).collect();
        assert_eq!(delivered, vec![0, 1, 2, 4, 5]);
        assert!(result.failed[0].reason.contains("deliver failed"));
    }

    #[test]
    fn every_delivery_failing_gives_distinct_reasons() {
        let store = MemoryStore::new().failing_all_uploads();
        let records = records_from_names(["Aya", "Aya", "Omar"]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();
        assert_eq!(result.succeeded(), 0);
        assert_eq!(result.failed_count(), 3);
        let reasons: BTreeSet<&str> = result.failed.iter().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons.len(), 3);
        assert!(result.aborted.is_none());
    }

    #[test]
    fn same_name_twice_gives_identical_artifacts() {
        let store = MemoryStore::new();
        let records = records_from_names(["محمد Aya", "محمد Aya"]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();
        assert_eq!(result.delivered[0].sha256, result.delivered[1].sha256);
        let files = store.files();
        assert_eq!(files[0].bytes, files[1].bytes);
    }

    #[test]
    fn unreachable_store_aborts_with_nothing_processed() {
        let store = MemoryStore::new().unreachable();
        let records = records_from_names(["Aya"]);
        let mut progress = CollectingProgress::default();
        let result = runner(&store).run(&records, &mut progress).unwrap();
        assert_eq!(result.processed, 0);
        assert!(result.folder.is_none());
        assert!(result.aborted.unwrap().contains("unreachable"));
        assert_eq!(store.calls().create_file, 0);
        assert!(progress.ticks.is_empty());
        assert!(progress.finished);
    }

    #[test]
    fn empty_record_list_is_rejected_before_resolution() {
        let store = MemoryStore::new();
        let runner = runner(&store);
        assert_eq!(runner.state(), BatchState::Idle);
        let err = runner.run(&[], &mut NullProgress).unwrap_err();
        assert!(matches!(err, BatchError::Configuration(_)));
        assert_eq!(store.calls().total(), 0);
    }

    #[test]
    fn existing_folder_is_reused() {
        let store = MemoryStore::new().with_folder("Certificates");
        let records = records_from_names(["Aya"]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();
        assert_eq!(store.calls().create_folder, 0);
        assert!(!result.folder.unwrap().created);
    }

    #[test]
    fn undisplayable_name_fails_only_that_record() {
        let store = MemoryStore::new();
        let records = records_from_names(["Aya", "\u{4E2D}\u{6587}", "Omar\u{4E2D}"]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();
        assert_eq!(result.failed_indices(), vec![1]);
        assert!(result.failed[0].reason.contains("shape failed"));
        assert_eq!(result.missing_glyphs.summary(), "U+4E2D");
        assert_eq!(store.calls().create_file, 2);
    }

    #[test]
    fn zero_page_template_fails_each_record_with_format_error() {
        let store = MemoryStore::new();
        let template = Template::from_pdf(template_pdf(842, 595, 0)).unwrap();
        let records = records_from_names(["Aya", "Omar"]);
        let result = BatchRunner::new(&store, BatchConfig::default(), template, tiny_font())
            .run(&records, &mut NullProgress)
            .unwrap();
        assert_eq!(result.failed_indices(), vec![0, 1]);
        assert!(result.failed.iter().all(|f| f.reason.contains("compose failed")));
        assert_eq!(store.calls().create_file, 0);
    }

    #[test]
    fn progress_is_throttled_but_ends_on_last_record() {
        let store = MemoryStore::new();
        let config = BatchConfig {
            progress_every: 2,
            ..BatchConfig::default()
        };
        let records = records_from_names(["a", "b", "c", "d", "e"]);
        let mut progress = CollectingProgress::default();
        BatchRunner::new(&store, config, pdf_template(), tiny_font())
            .run(&records, &mut progress)
            .unwrap();
        let currents: Vec<usize> = progress.ticks.iter().map(|t| t.current).collect();
        assert_eq!(currents, vec![2, 4, 5]);
        assert!(progress.finished);
    }

    #[test]
    fn image_template_batch_delivers_pdfs() {
        let store = MemoryStore::new();
        let template = Template::from_image(&png_bytes(64, 48), Size::a4_landscape()).unwrap();
        let records = records_from_names(["Aya"]);
        let result = BatchRunner::new(&store, BatchConfig::default(), template, tiny_font())
            .run(&records, &mut NullProgress)
            .unwrap();
        assert_eq!(result.succeeded(), 1);
        assert!(store.files()[0].bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn missing_font_aborts_before_any_store_call() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("template.pdf");
        std::fs::write(&template_path, template_pdf(842, 595, 1)).unwrap();
        let config = BatchConfig {
            font_path: dir.path().join("missing.ttf"),
            ..BatchConfig::default()
        };
        let store = MemoryStore::new();
        let records = records_from_names(["Aya", "محمد"]);
        let err = run_batch(&config, &store, &template_path, &records, &mut NullProgress)
            .unwrap_err();
        assert!(matches!(err, BatchError::Configuration(_)));
        assert_eq!(store.calls().total(), 0);
    }

    #[test]
    fn run_batch_loads_resources_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("template.png");
        std::fs::write(&template_path, png_bytes(32, 32)).unwrap();
        let font_path = dir.path().join("TinySans.ttf");
        std::fs::write(&font_path, tiny_font_bytes()).unwrap();
        let config = BatchConfig {
            font_path,
            label_prefix: "Award".to_string(),
            ..BatchConfig::default()
        };
        let store = MemoryStore::new();
        let records = records_from_names(["Aya"]);
        let result =
            run_batch(&config, &store, &template_path, &records, &mut NullProgress).unwrap();
        assert!(result.is_complete_success());
        assert_eq!(result.delivered[0].file_name, "Award Aya.pdf");
    }

    #[test]
    fn result_serializes_to_json() {
        let store = MemoryStore::new();
        let records = records_from_names(["Aya"]);
        let result = runner(&store).run(&records, &mut NullProgress).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["delivered"][0]["file_name"], "Certificate Aya.pdf");
        assert_eq!(value["folder"]["name"], "Certificates");
    }
}
