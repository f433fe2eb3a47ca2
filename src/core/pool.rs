/// Value pool resolution — turns an authored [`ValueSpec`] into a
/// read-only, queryable pool.
use thiserror::Error;
use tracing::warn;

use crate::schema::value_spec::{ListData, PoolType, ValueSpec, WeightData};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    #[error("value pool is empty")]
    Empty,
    #[error("malformed weight in line '{line}' (expected value:weight with a non-negative number)")]
    MalformedWeight { line: String },
    #[error("every entry has weight 0, nothing can be selected")]
    NoSelectableEntry,
}

/// How entries of a resolved pool are drawn.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolKind {
    Uniform,
    /// Per-entry weights plus their running sums, for binary-search draws.
    Weighted {
        weights: Vec<f64>,
        cumulative: Vec<f64>,
    },
}

/// A parsed value pool. Immutable once built and shared freely between
/// generation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPool {
    entries: Vec<String>,
    kind: PoolKind,
}

impl ResolvedPool {
    /// Resolve a structured value specification.
    pub fn resolve(spec: &ValueSpec) -> Result<ResolvedPool, PoolError> {
        match spec {
            ValueSpec::Default(ListData::Text(raw)) => Self::from_text(raw, PoolType::Default),
            ValueSpec::Default(ListData::List(entries)) => Self::from_list(entries),
            ValueSpec::Weighted(WeightData::Text(raw)) => Self::from_text(raw, PoolType::Weighted),
            ValueSpec::Weighted(WeightData::Map(entries)) => Self::from_weights(
                entries.0.iter().map(|(value, weight)| (value.clone(), *weight)),
            ),
        }
    }

    /// Resolve an authored text blob according to its declared type.
    ///
    /// Default blobs hold one entry per line. Weighted blobs hold
    /// `value:weight` per line, split at the last `:` so values may
    /// contain colons themselves. Blank lines are ignored in both.
    pub fn from_text(raw: &str, pool_type: PoolType) -> Result<ResolvedPool, PoolError> {
        let lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());
        match pool_type {
            PoolType::Default => Self::from_list(lines),
            PoolType::Weighted => {
                let mut entries = Vec::new();
                for line in lines {
                    entries.push(parse_weighted_line(line)?);
                }
                Self::from_weights(entries)
            }
        }
    }

    /// A uniform pool. Entries are trimmed and blank ones dropped.
    pub fn from_list<I, S>(entries: I) -> Result<ResolvedPool, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<String> = entries
            .into_iter()
            .map(|e| e.as_ref().trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if entries.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(ResolvedPool {
            entries,
            kind: PoolKind::Uniform,
        })
    }

    /// A weighted pool. Zero weights are kept, so pool membership and order
    /// stay stable, but such entries are never drawn.
    pub fn from_weights<I>(entries: I) -> Result<ResolvedPool, PoolError>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut values = Vec::new();
        let mut weights = Vec::new();
        for (value, weight) in entries {
            if !weight.is_finite() || weight < 0.0 {
                return Err(PoolError::MalformedWeight {
                    line: format!("{}:{}", value, weight),
                });
            }
            values.push(value);
            weights.push(weight);
        }
        if values.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for (value, weight) in values.iter().zip(&weights) {
            if *weight == 0.0 {
                warn!(entry = %value, "weighted pool entry has weight 0 and will never be drawn");
            }
            total += weight;
            cumulative.push(total);
        }
        if total <= 0.0 {
            return Err(PoolError::NoSelectableEntry);
        }

        Ok(ResolvedPool {
            entries: values,
            kind: PoolKind::Weighted {
                weights,
                cumulative,
            },
        })
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kind(&self) -> &PoolKind {
        &self.kind
    }

    pub fn is_weighted(&self) -> bool {
        matches!(self.kind, PoolKind::Weighted { .. })
    }

    /// Relative weight of an entry; uniform entries all weigh 1.
    pub fn weight(&self, index: usize) -> f64 {
        match &self.kind {
            PoolKind::Uniform => 1.0,
            PoolKind::Weighted { weights, .. } => weights.get(index).copied().unwrap_or(0.0),
        }
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        match &self.kind {
            PoolKind::Uniform => self.entries.len() as f64,
            PoolKind::Weighted { cumulative, .. } => cumulative.last().copied().unwrap_or(0.0),
        }
    }

    /// Number of entries that can ever be drawn.
    pub fn selectable_count(&self) -> usize {
        match &self.kind {
            PoolKind::Uniform => self.entries.len(),
            PoolKind::Weighted { weights, .. } => weights.iter().filter(|w| **w > 0.0).count(),
        }
    }
}

fn parse_weighted_line(line: &str) -> Result<(String, f64), PoolError> {
    let malformed = || PoolError::MalformedWeight {
        line: line.to_string(),
    };
    let (value, weight) = line.rsplit_once(':').ok_or_else(malformed)?;
    let value = value.trim();
    let weight: f64 = weight.trim().parse().map_err(|_| malformed())?;
    if value.is_empty() || !weight.is_finite() || weight < 0.0 {
        return Err(malformed());
    }
    Ok((value.to_string(), weight))
}
