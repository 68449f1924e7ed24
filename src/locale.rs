use std::{fmt, str::FromStr};

use crate::{
    foundation::error::{PersistenceError, StudioError, StudioResult},
    storage::SharedStore,
};

pub const LOCALE_KEY: &str = "qr-barcode-language";

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ko,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ko => "ko",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::En => Self::Ko,
            Self::Ko => Self::En,
        }
    }

    /// Pick a locale from a POSIX/BCP-47 tag such as `ko_KR.UTF-8` or `en-US`.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().to_ascii_lowercase().starts_with("ko") {
            Self::Ko
        } else {
            Self::En
        }
    }

    /// Detect from `LC_ALL`, then `LANG`.
    pub fn detect() -> Self {
        ["LC_ALL", "LANG"]
            .iter()
            .filter_map(|k| std::env::var(k).ok())
            .find(|v| !v.is_empty())
            .map(|v| Self::from_tag(&v))
            .unwrap_or_default()
    }
}

impl FromStr for Locale {
    type Err = StudioError;

    fn from_str(s: &str) -> StudioResult<Self> {
        match s {
            "en" => Ok(Self::En),
            "ko" => Ok(Self::Ko),
            other => Err(StudioError::validation(format!(
                "unsupported locale code '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Locale preference backed by the key-value store.
pub struct LocalePreference {
    store: SharedStore,
    current: Locale,
}

impl LocalePreference {
    /// A valid persisted code wins over `detected`; anything else is ignored.
    pub fn load(store: SharedStore, detected: Locale) -> Self {
        let persisted = match store.get(LOCALE_KEY) {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse::<Locale>().ok()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read locale preference");
                None
            }
        };
        Self {
            store,
            current: persisted.unwrap_or(detected),
        }
    }

    pub fn get(&self) -> Locale {
        self.current
    }

    /// Update the in-memory preference and write it through.
    pub fn set(&mut self, locale: Locale) -> Result<(), PersistenceError> {
        self.current = locale;
        self.store
            .set(LOCALE_KEY, locale.code().as_bytes())
            .inspect_err(|e| tracing::warn!(error = %e, "failed to persist locale preference"))
    }

    pub fn toggle(&mut self) -> Result<Locale, PersistenceError> {
        let next = self.current.toggled();
        self.set(next)?;
        Ok(next)
    }
}
