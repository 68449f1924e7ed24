use chrono::Utc;
use rayon::prelude::*;

use crate::{
    export::{ExportEncoder, ExportFormat, ExportedFile, Exported, batch_file_name},
    foundation::error::{StudioError, StudioResult},
    options::{CodeKind, RenderOptions, RenderRequest},
    payload::{DataKind, EncodingInput, encode},
    render::{GenerationResult, SymbolRenderer},
    scheduler::PublishSink,
};

#[derive(Clone, Debug, PartialEq)]
pub enum BatchStatus {
    Pending,
    Generated(GenerationResult),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchItem {
    pub id: u64,
    pub raw_line: String,
    pub status: BatchStatus,
}

impl BatchItem {
    pub fn result(&self) -> Option<&GenerationResult> {
        match &self.status {
            BatchStatus::Generated(r) => Some(r),
            _ => None,
        }
    }
}

/// Options controlling [`BatchProcessor::run_all`].
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Render items on a dedicated rayon pool. Item order is preserved either way.
    pub parallel: bool,
    /// Override the number of rayon worker threads. `None` uses rayon defaults.
    pub threads: Option<usize>,
    /// Forward every generated item to the publish sink, in input order.
    pub record_history: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub generated: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct BatchExport {
    pub files: Vec<ExportedFile>,
    /// Generated items whose export failed.
    pub skipped: usize,
}

/// Owns the items of one batch upload.
#[derive(Debug, Default)]
pub struct BatchProcessor {
    items: Vec<BatchItem>,
    next_id: u64,
}

impl BatchProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current items with one `Pending` item per non-blank line.
    pub fn load(&mut self, raw_text: &str) -> usize {
        self.items = raw_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|line| {
                self.next_id += 1;
                BatchItem {
                    id: self.next_id,
                    raw_line: line.to_owned(),
                    status: BatchStatus::Pending,
                }
            })
            .collect();
        self.items.len()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Encode and render every item. One failing item never affects the others.
    ///
    /// Linear codes always encode lines as plain text. Multi-field data kinds (Wifi, VCard) cannot
    /// be expressed as one line and are rejected up front.
    #[tracing::instrument(
        skip_all,
        fields(items = self.items.len(), code = options.code_kind().as_str())
    )]
    pub fn run_all<R: SymbolRenderer + Sync>(
        &mut self,
        kind: DataKind,
        options: &RenderOptions,
        renderer: &R,
        opts: &BatchOptions,
        sink: Option<&mut dyn PublishSink>,
    ) -> StudioResult<BatchSummary> {
        options.validate()?;
        let kind = match options.code_kind() {
            CodeKind::Qr => kind,
            CodeKind::Barcode => DataKind::PlainText,
        };
        if !kind.is_single_field() {
            return Err(StudioError::validation(format!(
                "batch lines cannot carry multi-field {kind:?} data"
            )));
        }

        if opts.parallel {
            let pool = build_thread_pool(opts.threads)?;
            pool.install(|| {
                self.items.par_iter_mut().for_each(|item| {
                    item.status = generate(&item.raw_line, kind, options, renderer);
                })
            });
        } else {
            for item in &mut self.items {
                item.status = generate(&item.raw_line, kind, options, renderer);
            }
        }

        let mut summary = BatchSummary::default();
        for item in &self.items {
            match &item.status {
                BatchStatus::Generated(_) => summary.generated += 1,
                BatchStatus::Failed(reason) => {
                    summary.failed += 1;
                    tracing::debug!(id = item.id, %reason, "batch item failed");
                }
                BatchStatus::Pending => {}
            }
        }

        if opts.record_history {
            match sink {
                Some(sink) => self
                    .items
                    .iter()
                    .filter_map(BatchItem::result)
                    .for_each(|r| sink.published(r)),
                None => tracing::warn!("record_history set without a publish sink"),
            }
        }

        tracing::info!(
            generated = summary.generated,
            failed = summary.failed,
            "batch run finished"
        );
        Ok(summary)
    }

    /// Export every generated item as PNG, named `batch_<qr|barcode>_<n>.png` by input position.
    pub fn export_all(&self, exporter: &dyn ExportEncoder) -> BatchExport {
        let mut out = BatchExport::default();
        for (index, item) in self.items.iter().enumerate() {
            let Some(result) = item.result() else {
                continue;
            };
            match exporter.export(result, ExportFormat::Png) {
                Ok(Exported::File(mut file)) => {
                    file.name = batch_file_name(result.kind, index + 1);
                    out.files.push(file);
                }
                Ok(Exported::Unavailable(notice)) => {
                    tracing::warn!(id = item.id, %notice, "batch export unavailable");
                    out.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(id = item.id, error = %e, "batch export failed");
                    out.skipped += 1;
                }
            }
        }
        tracing::info!(
            files = out.files.len(),
            skipped = out.skipped,
            "batch export finished"
        );
        out
    }
}

fn generate<R: SymbolRenderer>(
    line: &str,
    kind: DataKind,
    options: &RenderOptions,
    renderer: &R,
) -> BatchStatus {
    let input = match EncodingInput::from_raw(kind, line) {
        Ok(input) => input,
        Err(e) => return BatchStatus::Failed(e.to_string()),
    };
    let Some(payload) = encode(&input).payload() else {
        return BatchStatus::Failed("nothing to encode".to_owned());
    };
    let request = match RenderRequest::new(payload, options.clone()) {
        Ok(r) => r,
        Err(e) => return BatchStatus::Failed(e.to_string()),
    };
    match renderer.render(&request) {
        Ok(image) => BatchStatus::Generated(GenerationResult::new(&request, image, Utc::now())),
        Err(e) => BatchStatus::Failed(e.reason()),
    }
}

fn build_thread_pool(threads: Option<usize>) -> StudioResult<rayon::ThreadPool> {
    if threads == Some(0) {
        return Err(StudioError::validation(
            "batch 'threads' must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder.build().map_err(|e| {
        StudioError::Other(anyhow::anyhow!("failed to build rayon thread pool: {e}"))
    })
}
