//! Publisher-supplied metadata
//!
//! Encoders announce codec and bitrate hints through publish arguments and
//! `onMetaData`. Only scalar values matter to the ingest core, so nested AMF
//! structures are flattened away by the transport before they reach here.

use std::collections::HashMap;

use serde::Serialize;

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Null or undefined
    Null,

    /// Boolean value
    Boolean(bool),

    /// Numeric value (AMF numbers are always doubles)
    Number(f64),

    /// UTF-8 string
    String(String),
}

impl MetadataValue {
    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    ///
    /// Numeric strings are accepted since query-string arguments arrive as text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            MetadataValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

impl Default for MetadataValue {
    fn default() -> Self {
        MetadataValue::Null
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Boolean(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

/// FLV `audiocodecid` values seen from common encoders
fn audio_codec_name(id: u32) -> Option<&'static str> {
    match id {
        2 => Some("mp3"),
        10 => Some("aac"),
        11 => Some("speex"),
        13 => Some("opus"),
        _ => None,
    }
}

/// Metadata supplied by a publisher
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PublishMetadata {
    values: HashMap<String, MetadataValue>,
}

impl PublishMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.values.iter()
    }

    /// Audio codec hint, from a numeric FLV codec id or a codec name
    pub fn audio_codec(&self) -> Option<String> {
        let value = self.get("audiocodecid")?;
        if let Some(name) = value.as_str().filter(|s| s.parse::<f64>().is_err()) {
            return Some(name.to_string());
        }
        let id = value.as_number()?;
        audio_codec_name(id as u32).map(str::to_string)
    }

    /// Audio bitrate hint in kbps
    pub fn audio_bitrate_kbps(&self) -> Option<u32> {
        self.get("audiodatarate")?
            .as_number()
            .filter(|n| *n > 0.0)
            .map(|n| n.round() as u32)
    }

    /// Audio sample rate hint in Hz
    pub fn audio_sample_rate_hz(&self) -> Option<u32> {
        self.get("audiosamplerate")?
            .as_number()
            .filter(|n| *n > 0.0)
            .map(|n| n as u32)
    }

    /// Audio channel count hint
    ///
    /// Falls back to the legacy `stereo` flag when `audiochannels` is absent.
    pub fn audio_channels(&self) -> Option<u8> {
        if let Some(n) = self.get("audiochannels").and_then(MetadataValue::as_number) {
            return Some(n as u8);
        }
        self.get("stereo")
            .and_then(MetadataValue::as_bool)
            .map(|stereo| if stereo { 2 } else { 1 })
    }
}

impl FromIterator<(String, MetadataValue)> for PublishMetadata {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
