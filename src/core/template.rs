/// String templates — `${key}` placeholder parsing and interpolation.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::pool::ResolvedPool;
use crate::core::random::RandomSource;
use crate::core::sampling::sample_one;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown template key '{0}'")]
    UnknownKey(String),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Placeholder `${name}`, replaced by a value drawn from the key's pool.
    Key(String),
}

/// A parsed template — a sequence of segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `${name}` → `Key`, where `name` is alphanumeric plus `_` and `-`
    /// - anything else, including a `${` that does not close into a valid
    ///   name, → `Literal`
    pub fn parse(input: &str) -> Template {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            literal_buf.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let name_len = after
                .find(|c: char| !is_key_char(c))
                .unwrap_or(after.len());

            if name_len > 0 && after[name_len..].starts_with('}') {
                if !literal_buf.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                }
                segments.push(TemplateSegment::Key(after[..name_len].to_string()));
                rest = &after[name_len + 1..];
            } else {
                literal_buf.push_str("${");
                rest = after;
            }
        }

        literal_buf.push_str(rest);
        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Template { segments }
    }

    /// Every key mentioned, in order of appearance (repeats included).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::Key(name) => Some(name.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder, left to right, in a single pass.
    ///
    /// Each occurrence draws its own value, so `${a} ${a}` may yield two
    /// different entries. Substituted text is never re-scanned.
    pub fn interpolate<R: RandomSource + ?Sized>(
        &self,
        key_pools: &FxHashMap<String, ResolvedPool>,
        rng: &mut R,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Key(name) => {
                    let pool = key_pools
                        .get(name)
                        .ok_or_else(|| TemplateError::UnknownKey(name.clone()))?;
                    let index = sample_one(pool, rng);
                    out.push_str(pool.get(index).unwrap_or_default());
                }
            }
        }
        Ok(out)
    }
}

/// Parse and interpolate in one step.
pub fn interpolate<R: RandomSource + ?Sized>(
    template: &str,
    key_pools: &FxHashMap<String, ResolvedPool>,
    rng: &mut R,
) -> Result<String, TemplateError> {
    Template::parse(template).interpolate(key_pools, rng)
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
