//! Decoding helpers for backend payloads, which send `false` in place of
//! missing scalars and `[id, display_name]` pairs for record references.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::ids::LinkedRecordId;

#[derive(Deserialize)]
#[serde(untagged)]
enum Falsy<T> {
    Value(T),
    Flag(#[allow(dead_code)] bool),
}

pub(crate) fn falsy_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match Option::<Falsy<T>>::deserialize(deserializer)? {
        Some(Falsy::Value(value)) => Ok(Some(value)),
        Some(Falsy::Flag(_)) | None => Ok(None),
    }
}

pub(crate) fn falsy_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(falsy_option(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordReference {
    Id(i64),
    Pair(i64, IgnoredAny),
    Flag(#[allow(dead_code)] bool),
}

pub(crate) fn record_reference<'de, D>(deserializer: D) -> Result<Option<LinkedRecordId>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Option::<RecordReference>::deserialize(deserializer)? {
        Some(RecordReference::Id(id)) | Some(RecordReference::Pair(id, _)) => id,
        Some(RecordReference::Flag(_)) | None => return Ok(None),
    };
    Ok((id > 0).then_some(LinkedRecordId(id)))
}

/// Writes `None` the way the backend expects a missing value: as `false`.
pub(crate) fn none_as_false<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match value {
        Some(value) => value.serialize(serializer),
        None => serializer.serialize_bool(false),
    }
}
