//! Canonical payload encoding.
//!
//! Maps typed structured input to the exact string handed to a symbol renderer. The rules follow
//! the de-facto conventions scanning apps understand (`mailto:`, `WIFI:T:..;;`, vCard 3.0), so
//! the output must stay byte-for-byte stable.

use std::fmt;

use crate::foundation::error::{StudioError, StudioResult};

/// The kind of data a matrix code carries.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    #[value(name = "text")]
    #[serde(rename = "text")]
    PlainText,
    Url,
    Email,
    Phone,
    Sms,
    Wifi,
    #[value(name = "vcard")]
    VCard,
    Geo,
}

impl DataKind {
    /// Kinds whose input is a single free-form string.
    pub fn is_single_field(self) -> bool {
        !matches!(self, Self::Wifi | Self::VCard)
    }
}

/// WiFi authentication scheme, as written into the `T:` field.
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
pub enum WifiSecurity {
    #[default]
    #[value(name = "wpa")]
    #[serde(rename = "WPA")]
    Wpa,
    #[value(name = "wep")]
    #[serde(rename = "WEP")]
    Wep,
    #[value(name = "nopass")]
    #[serde(rename = "nopass")]
    Open,
}

impl WifiSecurity {
    pub fn token(self) -> &'static str {
        match self {
            Self::Wpa => "WPA",
            Self::Wep => "WEP",
            Self::Open => "nopass",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WifiFields {
    pub ssid: String,
    pub password: String,
    pub security: WifiSecurity,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VCardFields {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub organization: String,
}

/// Structured input for one [`DataKind`]. Each variant carries only the fields its kind uses.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EncodingInput {
    #[serde(rename = "text")]
    PlainText { raw: String },
    Url { raw: String },
    Email { raw: String },
    Phone { raw: String },
    Sms { raw: String },
    Geo { raw: String },
    Wifi(WifiFields),
    #[serde(rename = "vcard")]
    VCard(VCardFields),
}

impl Default for EncodingInput {
    fn default() -> Self {
        Self::PlainText { raw: String::new() }
    }
}

impl EncodingInput {
    /// Build the input for a single-field kind from one line of text.
    ///
    /// Fails for [`DataKind::Wifi`] and [`DataKind::VCard`], which need structured fields.
    pub fn from_raw(kind: DataKind, raw: impl Into<String>) -> StudioResult<Self> {
        let raw = raw.into();
        Ok(match kind {
            DataKind::PlainText => Self::PlainText { raw },
            DataKind::Url => Self::Url { raw },
            DataKind::Email => Self::Email { raw },
            DataKind::Phone => Self::Phone { raw },
            DataKind::Sms => Self::Sms { raw },
            DataKind::Geo => Self::Geo { raw },
            DataKind::Wifi | DataKind::VCard => {
                return Err(StudioError::validation(format!(
                    "data kind {kind:?} needs structured fields, not a single line"
                )));
            }
        })
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Self::PlainText { .. } => DataKind::PlainText,
            Self::Url { .. } => DataKind::Url,
            Self::Email { .. } => DataKind::Email,
            Self::Phone { .. } => DataKind::Phone,
            Self::Sms { .. } => DataKind::Sms,
            Self::Geo { .. } => DataKind::Geo,
            Self::Wifi(_) => DataKind::Wifi,
            Self::VCard(_) => DataKind::VCard,
        }
    }
}

/// The exact string encoded into a symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CanonicalPayload(String);

impl CanonicalPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub(crate) fn from_stored(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CanonicalPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`encode`]: a payload, or `Skipped` when the minimum-required field is empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    Payload(CanonicalPayload),
    Skipped,
}

impl Encoded {
    pub fn payload(self) -> Option<CanonicalPayload> {
        match self {
            Self::Payload(p) => Some(p),
            Self::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

const URL_SCHEME_PREFIX: &str = "http";

/// Map structured input to its canonical payload. Pure and deterministic.
pub fn encode(input: &EncodingInput) -> Encoded {
    let payload = match input {
        EncodingInput::PlainText { raw } => {
            if raw.is_empty() {
                return Encoded::Skipped;
            }
            raw.clone()
        }
        EncodingInput::Url { raw } => {
            if raw.is_empty() {
                return Encoded::Skipped;
            }
            if raw.starts_with(URL_SCHEME_PREFIX) {
                raw.clone()
            } else {
                format!("https://{raw}")
            }
        }
        EncodingInput::Email { raw } => return prefixed("mailto:", raw),
        EncodingInput::Phone { raw } => return prefixed("tel:", raw),
        EncodingInput::Sms { raw } => return prefixed("sms:", raw),
        // Coordinates are passed through unvalidated.
        EncodingInput::Geo { raw } => return prefixed("geo:", raw),
        EncodingInput::Wifi(w) => {
            if w.ssid.is_empty() {
                return Encoded::Skipped;
            }
            format!(
                "WIFI:T:{};S:{};P:{};;",
                w.security.token(),
                w.ssid,
                w.password
            )
        }
        EncodingInput::VCard(v) => {
            if v.name.is_empty() {
                return Encoded::Skipped;
            }
            format!(
                "BEGIN:VCARD\nVERSION:3.0\nFN:{}\nTEL:{}\nEMAIL:{}\nORG:{}\nEND:VCARD",
                v.name, v.phone, v.email, v.organization
            )
        }
    };
    Encoded::Payload(CanonicalPayload(payload))
}

fn prefixed(prefix: &str, raw: &str) -> Encoded {
    if raw.is_empty() {
        Encoded::Skipped
    } else {
        Encoded::Payload(CanonicalPayload(format!("{prefix}{raw}")))
    }
}
