/// Value specifications — the raw, authored form of a value pool.
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// How a pool's entries are drawn. Mirrors the `type` tag of a
/// [`ValueSpec`] for callers that hand over raw text directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Default,
    #[serde(rename = "weight", alias = "weighted")]
    Weighted,
}

/// A value pool as the editor stores it: `{ "type": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ValueSpec {
    /// Ordered entries, drawn uniformly.
    #[serde(rename = "default")]
    Default(ListData),
    /// Entries with a relative weight each.
    #[serde(rename = "weight", alias = "weighted")]
    Weighted(WeightData),
}

/// Payload of a default pool: a text blob (one entry per line) or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListData {
    Text(String),
    List(Vec<String>),
}

/// Payload of a weighted pool: a `value:weight` text blob or a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightData {
    Text(String),
    Map(WeightedEntries),
}

/// A `value → weight` mapping that keeps its declared order.
///
/// Branch nodes pair the k-th entry with their k-th outgoing edge, so the
/// order an author wrote the mapping in must survive deserialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightedEntries(pub Vec<(String, f64)>);

impl ValueSpec {
    /// A default pool from a list of entries.
    pub fn list<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Default(ListData::List(entries.into_iter().map(Into::into).collect()))
    }

    /// A weighted pool from `(value, weight)` pairs.
    pub fn weighted<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self::Weighted(WeightData::Map(WeightedEntries(
            entries.into_iter().map(|(v, w)| (v.into(), w)).collect(),
        )))
    }

    /// A pool from an authored text blob and its declared type.
    pub fn from_text(raw: &str, pool_type: PoolType) -> Self {
        match pool_type {
            PoolType::Default => Self::Default(ListData::Text(raw.to_string())),
            PoolType::Weighted => Self::Weighted(WeightData::Text(raw.to_string())),
        }
    }

    pub fn pool_type(&self) -> PoolType {
        match self {
            Self::Default(_) => PoolType::Default,
            Self::Weighted(_) => PoolType::Weighted,
        }
    }

    /// Render the spec back into its text-blob form, for error reports.
    pub fn to_raw_text(&self) -> String {
        match self {
            Self::Default(ListData::Text(text)) | Self::Weighted(WeightData::Text(text)) => {
                text.clone()
            }
            Self::Default(ListData::List(entries)) => entries.join("\n"),
            Self::Weighted(WeightData::Map(entries)) => entries
                .0
                .iter()
                .map(|(value, weight)| format!("{}:{}", value, weight))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl Serialize for WeightedEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (value, weight) in &self.0 {
            map.serialize_entry(value, weight)?;
        }
        map.end()
    }
}

struct WeightedEntriesVisitor;

impl<'de> Visitor<'de> for WeightedEntriesVisitor {
    type Value = WeightedEntries;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of value to numeric weight")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((value, weight)) = access.next_entry::<String, f64>()? {
            entries.push((value, weight));
        }
        Ok(WeightedEntries(entries))
    }
}

impl<'de> Deserialize<'de> for WeightedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(WeightedEntriesVisitor)
    }
}
