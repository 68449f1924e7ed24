use std::sync::Arc;

use crate::{
    config::StudioConfig,
    foundation::error::StudioResult,
    history::HistoryStore,
    locale::{Locale, LocalePreference},
    storage::{FileStore, SharedStore},
};

/// Process-wide state, constructed once at startup.
///
/// Persisted history and the locale preference are loaded here, before anything can read them.
pub struct AppContext {
    config: StudioConfig,
    store: SharedStore,
    history: HistoryStore,
    locale: LocalePreference,
}

impl AppContext {
    /// Open the file-backed store under `config.data_dir`.
    pub fn open(config: StudioConfig) -> StudioResult<Self> {
        let store: SharedStore = Arc::new(FileStore::new(&config.data_dir));
        Self::with_store(config, store, Locale::detect())
    }

    pub fn with_store(
        config: StudioConfig,
        store: SharedStore,
        detected: Locale,
    ) -> StudioResult<Self> {
        config.validate()?;
        let history = HistoryStore::load(store.clone(), config.history_capacity);
        let locale = LocalePreference::load(store.clone(), detected);
        tracing::debug!(
            history = history.len(),
            locale = %locale.get(),
            "application context ready"
        );
        Ok(Self {
            config,
            store,
            history,
            locale,
        })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryStore {
        &mut self.history
    }

    pub fn locale(&self) -> &LocalePreference {
        &self.locale
    }

    pub fn locale_mut(&mut self) -> &mut LocalePreference {
        &mut self.locale
    }
}
