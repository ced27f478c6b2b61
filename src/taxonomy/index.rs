use super::normalize::normalize;
use std::collections::{HashMap, hash_map::Entry};
use thiserror::Error;
use tracing::warn;

pub const LEVEL_SEPARATOR: &str = " > ";

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("taxonomy is empty")]
    Empty,
}

/// Two taxonomy entries that share a normalized form. The first entry stays
/// in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub normalized: String,
    pub kept: String,
    pub dropped: String,
}

/// The fixed set of categories for a run plus the normalized lookup index.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    entries: Vec<String>,
    index: HashMap<String, usize>,
    duplicates: Vec<DuplicateEntry>,
}

impl Taxonomy {
    pub fn new(entries: Vec<String>) -> Result<Self, TaxonomyError> {
        if entries.is_empty() {
            return Err(TaxonomyError::Empty);
        }

        let mut index = HashMap::with_capacity(entries.len());
        let mut duplicates = Vec::new();
        for (position, entry) in entries.iter().enumerate() {
            match index.entry(normalize(entry)) {
                Entry::Vacant(slot) => {
                    slot.insert(position);
                }
                Entry::Occupied(slot) => {
                    let kept = &entries[*slot.get()];
                    warn!(
                        target: "catmap.setup",
                        normalized = %slot.key(),
                        kept = %kept,
                        dropped = %entry,
                        "duplicate_normalized_category"
                    );
                    duplicates.push(DuplicateEntry {
                        normalized: slot.key().clone(),
                        kept: kept.clone(),
                        dropped: entry.clone(),
                    });
                }
            }
        }

        Ok(Self {
            entries,
            index,
            duplicates,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.entries.get(position).map(String::as_str)
    }

    /// Exact lookup by an already-normalized key.
    pub fn lookup_normalized(&self, normalized: &str) -> Option<&str> {
        self.index
            .get(normalized)
            .and_then(|position| self.get(*position))
    }

    pub fn duplicates(&self) -> &[DuplicateEntry] {
        &self.duplicates
    }
}

/// Joins the last `depth` levels of a category path.
pub fn trailing_segment(category: &str, depth: usize) -> String {
    let levels: Vec<&str> = category.split(LEVEL_SEPARATOR).collect();
    let start = levels.len().saturating_sub(depth);
    levels[start..].join(LEVEL_SEPARATOR)
}
