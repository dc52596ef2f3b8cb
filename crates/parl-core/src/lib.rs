//! Record model for upstream parliamentary data.
//!
//! Decoding is tolerant at the field level: a field that is absent or `null`
//! takes its default value. A payload that is not JSON, has no `objects`
//! array, or carries a field of the wrong JSON type fails as a whole.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "parl-core";

/// Upstream collection wrapper: `{"objects": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub objects: Vec<T>,
}

/// Bilingual bill title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BillName {
    #[serde(default, deserialize_with = "null_as_default")]
    pub en: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Bill {
    #[serde(default, deserialize_with = "null_as_default")]
    pub session: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub legisinfo_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub introduced: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: BillName,
    #[serde(default, deserialize_with = "null_as_default")]
    pub number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

/// English-only display text. Upstream sends more locales for some fields;
/// only `en` is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnglishText {
    #[serde(default, deserialize_with = "null_as_default")]
    pub en: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Party {
    #[serde(default, deserialize_with = "null_as_default")]
    pub short_name: EnglishText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Riding {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: EnglishText,
    #[serde(default, deserialize_with = "null_as_default")]
    pub province: String,
}

/// Member of parliament, current snapshot only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Mp {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_party: Party,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_riding: Riding,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
}

/// Domain identifier used as the upsert conflict target.
pub trait NaturalKey {
    const KIND: &'static str;

    fn natural_key(&self) -> String;
}

impl NaturalKey for Bill {
    const KIND: &'static str = "bill";

    fn natural_key(&self) -> String {
        self.legisinfo_id.to_string()
    }
}

impl NaturalKey for Mp {
    const KIND: &'static str = "mp";

    fn natural_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a full `{"objects": [...]}` body. Either every record decodes or
/// none are returned.
pub fn decode_collection<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, DecodeError> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
    Ok(envelope.objects)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
