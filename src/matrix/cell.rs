//! Matrix cell identity
//!
//! A cell is an ordered tuple of `(axis, value)` bindings. Its key
//! (`axis=value,axis=value`) is the stable serialization used by the
//! ledger; its ordering is the resolver's deterministic order.

use crate::error::{DrydockError, DrydockResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// One `axis=value` binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AxisBinding {
    axis: String,
    value: String,
}

impl AxisBinding {
    pub fn axis(&self) -> &str {
        &self.axis
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// One concrete environment variant
///
/// Cheap to clone; the bindings are shared and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatrixCell {
    bindings: Arc<[AxisBinding]>,
}

impl MatrixCell {
    /// Build a cell from bindings in axis order
    pub fn new<A, V>(bindings: impl IntoIterator<Item = (A, V)>) -> Self
    where
        A: Into<String>,
        V: Into<String>,
    {
        let bindings: Vec<AxisBinding> = bindings
            .into_iter()
            .map(|(axis, value)| AxisBinding {
                axis: axis.into(),
                value: value.into(),
            })
            .collect();
        Self {
            bindings: bindings.into(),
        }
    }

    /// Parse a key produced by [`MatrixCell::key`]
    pub fn parse_key(key: &str) -> DrydockResult<Self> {
        let mut pairs = Vec::new();
        for part in key.split(',') {
            let (axis, value) = part.split_once('=').ok_or_else(|| {
                DrydockError::User(format!(
                    "Invalid cell '{}': expected axis=value pairs separated by ','",
                    key
                ))
            })?;
            if axis.is_empty() || value.is_empty() {
                return Err(DrydockError::User(format!(
                    "Invalid cell '{}': empty axis or value",
                    key
                )));
            }
            pairs.push((axis.to_string(), value.to_string()));
        }
        Ok(Self::new(pairs))
    }

    pub fn bindings(&self) -> &[AxisBinding] {
        &self.bindings
    }

    /// Value bound to `axis`, if any
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.axis == axis)
            .map(|b| b.value.as_str())
    }

    /// Whether every `axis=value` in `partial` is bound in this cell
    pub fn matches_all<'a>(&self, partial: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
        partial
            .into_iter()
            .all(|(axis, value)| self.get(axis) == Some(value))
    }

    /// Stable key used by the ledger
    pub fn key(&self) -> String {
        self.bindings
            .iter()
            .map(|b| format!("{}={}", b.axis, b.value))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Human and filesystem friendly name (`python-3.11_backend-sqlite`)
    pub fn slug(&self) -> String {
        let raw = self
            .bindings
            .iter()
            .map(|b| format!("{}-{}", b.axis, b.value))
            .collect::<Vec<_>>()
            .join("_");
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect()
    }

    /// Collision-free storage name: slug plus a short hash of the key
    pub fn storage_id(&self) -> String {
        let digest = Sha256::digest(self.key().as_bytes());
        let mut slug = self.slug();
        slug.truncate(96);
        format!("{}-{}", slug, hex::encode(&digest[..6]))
    }

    /// Substitute `{axis}` placeholders in `template`
    pub fn render(&self, template: &str) -> DrydockResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| DrydockError::TemplateAxis {
                template: template.to_string(),
                axis: after.to_string(),
            })?;
            let axis = &after[..end];
            let value = self.get(axis).ok_or_else(|| DrydockError::TemplateAxis {
                template: template.to_string(),
                axis: axis.to_string(),
            })?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }
}

impl fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl Ord for MatrixCell {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.bindings.iter().zip(other.bindings.iter()) {
            let ord = a
                .axis
                .cmp(&b.axis)
                .then_with(|| compare_values(&a.value, &b.value));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.bindings.len().cmp(&other.bindings.len())
    }
}

impl PartialOrd for MatrixCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for MatrixCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for MatrixCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Self::parse_key(&key).map_err(serde::de::Error::custom)
    }
}

/// Order axis values: dotted numeric versions first (numerically),
/// then everything else byte-wise.
pub fn compare_values(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Parse `3`, `3.11` or `3.11.2` as a version, padding missing parts
fn parse_version(value: &str) -> Option<semver::Version> {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let mut padded = parts
        .iter()
        .map(|p| p.trim_start_matches('0'))
        .map(|p| if p.is_empty() { "0" } else { p })
        .collect::<Vec<_>>();
    padded.resize(3, "0");
    semver::Version::parse(&padded.join(".")).ok()
}
