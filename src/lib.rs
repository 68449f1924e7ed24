//! Codestudio turns structured input into QR and linear barcode payloads and keeps the pieces
//! around the drawing step: a debounced regeneration channel, a bounded persisted history, and a
//! line-oriented batch processor.
//!
//! Symbol drawing itself is delegated to a [`SymbolRenderer`] implementation supplied by the
//! caller.
#![forbid(unsafe_code)]

mod foundation;

pub mod batch;
pub mod config;
pub mod context;
pub mod export;
pub mod history;
pub mod locale;
pub mod options;
pub mod overlay;
pub mod payload;
pub mod render;
pub mod scheduler;
pub mod storage;

pub use crate::foundation::core::{GenerationToken, Rgba8};
pub use crate::foundation::error::{
    ExportError, OverlayError, PersistenceError, RenderError, StudioError, StudioResult,
};

pub use crate::batch::{BatchItem, BatchOptions, BatchProcessor, BatchStatus, BatchSummary};
pub use crate::config::StudioConfig;
pub use crate::context::AppContext;
pub use crate::export::{ExportEncoder, ExportFormat, Exported, ExportedFile, ImageExporter};
pub use crate::history::{HistoryEntry, HistoryStore};
pub use crate::locale::{Locale, LocalePreference};
pub use crate::options::{
    CodeKind, ErrorRobustness, LinearOptions, MatrixOptions, RenderOptions, RenderRequest,
    Symbology,
};
pub use crate::overlay::{ImageOverlayCompositor, OverlayCompositor, OverlayImage};
pub use crate::payload::{CanonicalPayload, DataKind, Encoded, EncodingInput, encode};
pub use crate::render::{GenerationResult, SymbolRenderer};
pub use crate::scheduler::{
    ChannelState, GenerationDriver, GenerationInput, GenerationScheduler, InputChange,
    OverlayTicket, PublishSink, RenderTicket, SchedulerConfig, Step,
};
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore, SharedStore};
