//! Content fingerprints for build inputs
//!
//! A fingerprint is a SHA-256 digest over the cell identity and its
//! named inputs, tagged with a schema version. Inputs are hashed in
//! logical-name order with length prefixes, so the digest depends only
//! on names and bytes, never on discovery order.

use crate::matrix::MatrixCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Bump when the hashing scheme changes; older ledger entries then
/// never match and every cell rebuilds.
pub const FINGERPRINT_SCHEMA: u32 = 1;

const DOMAIN_TAG: &[u8] = b"drydock-fingerprint\0";

/// Named build inputs, canonically ordered by logical name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSet {
    inputs: BTreeMap<String, Vec<u8>>,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input; a repeated name replaces the earlier content
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.inputs.insert(name.into(), content.into());
    }

    pub(crate) fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Logical names in hashing order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.inputs.iter()
    }
}

impl<N: Into<String>, C: Into<Vec<u8>>> FromIterator<(N, C)> for InputSet {
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, content) in iter {
            set.insert(name, content);
        }
        set
    }
}

/// Opaque content hash plus schema version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    schema: u32,
    digest: String,
}

impl Fingerprint {
    /// Construct from stored parts (used by the ledger)
    pub fn from_parts(schema: u32, digest: impl Into<String>) -> Self {
        Self {
            schema,
            digest: digest.into(),
        }
    }

    pub fn schema(&self) -> u32 {
        self.schema
    }

    /// Full hex digest
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// First 12 hex characters, for display
    pub fn short(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }

    /// Whether this fingerprint was produced by the current scheme
    pub fn is_current_schema(&self) -> bool {
        self.schema == FINGERPRINT_SCHEMA
    }

    /// Equal digests under the current schema
    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.is_current_schema() && other.is_current_schema() && self.digest == other.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}:{}", self.schema, self.short())
    }
}

/// Compute the fingerprint of `inputs` for `cell`
///
/// Pure: no IO, no clock. Identical inputs always give identical output.
pub fn fingerprint(cell: &MatrixCell, inputs: &InputSet) -> Fingerprint {
    let mut hasher = Sha256::new();

    hasher.update(DOMAIN_TAG);
    hasher.update(FINGERPRINT_SCHEMA.to_le_bytes());
    update_framed(&mut hasher, cell.key().as_bytes());
    hasher.update((inputs.len() as u64).to_le_bytes());

    for (name, content) in inputs.iter() {
        update_framed(&mut hasher, name.as_bytes());
        update_framed(&mut hasher, content);
    }

    Fingerprint {
        schema: FINGERPRINT_SCHEMA,
        digest: hex::encode(hasher.finalize()),
    }
}

// Length prefix keeps ("ab", "c") and ("a", "bc") distinct
fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
