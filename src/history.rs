//! Bounded, durable log of successful generations.
//!
//! Persisted as a JSON array, most-recent first:
//! `[{"id": 1700000000000, "type": "qr", "data": "...", "image": "data:image/png;base64,...",
//! "timestamp": "2024-01-01T00:00:00.000Z"}]`.

use chrono::{DateTime, Utc};

use crate::{
    foundation::error::PersistenceError,
    options::{CodeKind, LinearOptions, MatrixOptions, RenderOptions},
    payload::CanonicalPayload,
    render::{GenerationResult, decode_image_data_uri, encode_png_data_uri},
    scheduler::PublishSink,
    storage::SharedStore,
};

pub const HISTORY_KEY: &str = "qr-barcode-history";
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    /// Unique and strictly increasing; milliseconds since the epoch when the clock allows.
    pub id: u64,
    pub result: GenerationResult,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct StoredEntry {
    id: u64,
    #[serde(rename = "type")]
    kind: CodeKind,
    data: String,
    image: String,
    #[serde(with = "iso_millis")]
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    options: Option<RenderOptions>,
}

impl StoredEntry {
    fn from_entry(entry: &HistoryEntry) -> Self {
        let image = encode_png_data_uri(&entry.result.image).unwrap_or_else(|e| {
            tracing::warn!(id = entry.id, error = %e, "failed to encode history image");
            String::new()
        });
        Self {
            id: entry.id,
            kind: entry.result.kind,
            data: entry.result.payload.as_str().to_owned(),
            image,
            timestamp: entry.result.created_at,
            options: Some(entry.result.options.clone()),
        }
    }

    fn to_entry(&self) -> Option<HistoryEntry> {
        let image = match decode_image_data_uri(&self.image) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(
                    id = self.id,
                    error = %e,
                    "dropping history entry with unreadable image"
                );
                return None;
            }
        };
        let options = match &self.options {
            Some(o) if o.code_kind() == self.kind => o.clone(),
            _ => match self.kind {
                CodeKind::Qr => RenderOptions::Matrix(MatrixOptions::default()),
                CodeKind::Barcode => RenderOptions::Linear(LinearOptions::default()),
            },
        };
        Some(HistoryEntry {
            id: self.id,
            result: GenerationResult {
                kind: self.kind,
                payload: CanonicalPayload::from_stored(self.data.clone()),
                options,
                image,
                created_at: self.timestamp,
            },
        })
    }
}

mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Most-recent-first history, capped at `capacity` entries.
///
/// Every mutation is written through to the store before returning. A failed write is logged
/// and remembered in [`HistoryStore::last_persist_error`]; the in-memory state stands.
pub struct HistoryStore {
    store: SharedStore,
    capacity: usize,
    entries: Vec<HistoryEntry>,
    stored: Vec<StoredEntry>,
    last_id: u64,
    last_persist_error: Option<String>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .field("last_id", &self.last_id)
            .finish()
    }
}

impl HistoryStore {
    /// Load persisted history. Missing, unreadable or malformed data yields an empty history.
    /// `capacity` is clamped to `1..=DEFAULT_HISTORY_CAPACITY`.
    #[tracing::instrument(skip(store))]
    pub fn load(store: SharedStore, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, DEFAULT_HISTORY_CAPACITY);
        let stored = match store.get(HISTORY_KEY) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<StoredEntry>>(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "persisted history is malformed; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted history; starting empty");
                Vec::new()
            }
        };

        let mut entries = Vec::new();
        let mut kept = Vec::new();
        for s in stored.into_iter().take(capacity) {
            if let Some(entry) = s.to_entry() {
                entries.push(entry);
                kept.push(s);
            }
        }
        let last_id = entries.iter().map(|e| e.id).max().unwrap_or(0);
        tracing::debug!(entries = entries.len(), "history loaded");

        Self {
            store,
            capacity,
            entries,
            stored: kept,
            last_id,
            last_persist_error: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries, most recent first.
    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }

    /// Insert at the head, drop the oldest beyond capacity, write through.
    pub fn record(&mut self, result: GenerationResult) -> HistoryEntry {
        let id = self.next_id(result.created_at);
        let entry = HistoryEntry { id, result };

        self.stored.insert(0, StoredEntry::from_entry(&entry));
        self.entries.insert(0, entry.clone());
        self.entries.truncate(self.capacity);
        self.stored.truncate(self.capacity);

        self.persist();
        entry
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stored.clear();
        let res = self.store.remove(HISTORY_KEY);
        self.note_persist(res);
    }

    fn next_id(&mut self, at: DateTime<Utc>) -> u64 {
        let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
        let id = millis.max(self.last_id + 1);
        self.last_id = id;
        id
    }

    fn persist(&mut self) {
        let res = serde_json::to_vec(&self.stored)
            .map_err(|e| PersistenceError::Unavailable(format!("serialize history: {e}")))
            .and_then(|bytes| self.store.set(HISTORY_KEY, &bytes));
        self.note_persist(res);
    }

    fn note_persist(&mut self, res: Result<(), PersistenceError>) {
        match res {
            Ok(()) => self.last_persist_error = None,
            Err(e) => {
                tracing::warn!(error = %e, "history write failed; keeping in-memory state");
                self.last_persist_error = Some(e.to_string());
            }
        }
    }
}

impl PublishSink for HistoryStore {
    fn published(&mut self, result: &GenerationResult) {
        self.record(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::{
        options::RenderRequest,
        payload::{EncodingInput, encode},
        storage::{KeyValueStore, MemoryStore},
    };

    fn result(text: &str, at_ms: i64) -> GenerationResult {
        let payload = encode(&EncodingInput::PlainText { raw: text.into() })
            .payload()
            .unwrap();
        let req =
            RenderRequest::new(payload, RenderOptions::Matrix(MatrixOptions::default())).unwrap();
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255]));
        GenerationResult::new(&req, img, Utc.timestamp_millis_opt(at_ms).unwrap())
    }

    #[test]
    fn keeps_twenty_most_recent_head_first() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), DEFAULT_HISTORY_CAPACITY);
        for i in 0..25 {
            history.record(result(&format!("r{i}"), 1_000 + i));
        }
        let data: Vec<_> = history
            .list()
            .iter()
            .map(|e| e.result.payload.as_str().to_owned())
            .collect();
        assert_eq!(data.len(), 20);
        assert_eq!(data[0], "r24");
        assert_eq!(data[19], "r5");

        let reloaded = HistoryStore::load(store, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(reloaded.list(), history.list());
    }

    #[test]
    fn capacity_never_exceeds_twenty() {
        let mut history = HistoryStore::load(Arc::new(MemoryStore::new()), 50);
        assert_eq!(history.capacity(), DEFAULT_HISTORY_CAPACITY);
        for i in 0..25 {
            history.record(result(&format!("r{i}"), 1_000 + i));
        }
        assert_eq!(history.len(), 20);

        let history = HistoryStore::load(Arc::new(MemoryStore::new()), 0);
        assert_eq!(history.capacity(), 1);
    }

    #[test]
    fn ids_are_unique_and_increasing_under_clock_collisions() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store, 5);
        let a = history.record(result("a", 5_000));
        let b = history.record(result("b", 5_000));
        let c = history.record(result("c", 4_000));
        assert_eq!(a.id, 5_000);
        assert_eq!(b.id, 5_001);
        assert_eq!(c.id, 5_002);
    }

    #[test]
    fn persisted_layout_matches_wire_format() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), 20);
        history.record(result("hello", 1_704_067_200_123));

        let raw = store.get(HISTORY_KEY).unwrap().unwrap();
        let v: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let first = &v.as_array().unwrap()[0];
        assert_eq!(first["id"], 1_704_067_200_123u64);
        assert_eq!(first["type"], "qr");
        assert_eq!(first["data"], "hello");
        assert_eq!(first["timestamp"], "2024-01-01T00:00:00.123Z");
        assert!(
            first["image"]
                .as_str()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );
    }

    #[test]
    fn malformed_data_degrades_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(HISTORY_KEY, b"{not json").unwrap();
        let history = HistoryStore::load(store, 20);
        assert!(history.is_empty());
    }

    #[test]
    fn entries_from_older_writers_load_with_default_options() {
        let store = Arc::new(MemoryStore::new());
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([9, 9, 9, 255]));
        let uri = encode_png_data_uri(&img).unwrap();
        let json = serde_json::json!([
            {
                "id": 7,
                "type": "barcode",
                "data": "12345",
                "image": uri,
                "timestamp": "2024-05-01T10:00:00.000Z"
            },
            {
                "id": 6,
                "type": "qr",
                "data": "x",
                "image": "data:image/png;base64,AAAA",
                "timestamp": "2024-05-01T09:00:00.000Z"
            }
        ]);
        store.set(HISTORY_KEY, json.to_string().as_bytes()).unwrap();

        let history = HistoryStore::load(store, 20);
        assert_eq!(history.len(), 1);
        let e = &history.list()[0];
        assert_eq!(e.id, 7);
        assert_eq!(e.result.kind, CodeKind::Barcode);
        assert!(matches!(e.result.options, RenderOptions::Linear(_)));
    }

    #[test]
    fn failed_write_keeps_memory_state() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), 20);
        store.set_fail_writes(true);

        history.record(result("kept", 1));
        assert_eq!(history.len(), 1);
        assert!(history.last_persist_error().is_some());
        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);

        store.set_fail_writes(false);
        history.record(result("next", 2));
        assert!(history.last_persist_error().is_none());
        assert_eq!(HistoryStore::load(store, 20).len(), 2);
    }

    #[test]
    fn clear_removes_persisted_key() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), 20);
        history.record(result("a", 1));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);
    }
}
