//! Deduplication of business records
//!
//! Records are duplicates iff their external identifiers match. A secondary
//! fingerprint (normalized name, street, and ZIP) flags new identifiers that
//! look like an already-stored business; those are still stored, only
//! reported.

mod normalize;

pub use normalize::fingerprint;

use crate::storage::{BusinessRecord, ResultStore, StorageResult};
use std::collections::{HashMap, HashSet};

/// Outcome of checking one record against what is already stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not stored yet
    New,

    /// A record with the same identifier is stored
    Duplicate,

    /// Not stored yet, but its fingerprint matches the record `of`
    NearDuplicate { of: String },
}

impl Verdict {
    /// Returns true if the record should be stored
    pub fn is_new(&self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

#[derive(Debug)]
enum KeySet {
    /// Every stored identifier held in memory
    Preloaded {
        ids: HashSet<String>,
        fingerprints: HashMap<String, String>,
    },

    /// Too many records to hold; ask the store per record
    StoreBacked,
}

/// Membership checks against the result store
#[derive(Debug)]
pub struct Deduplicator {
    keys: KeySet,
}

impl Deduplicator {
    /// Builds the deduplicator from the records already stored
    ///
    /// # Arguments
    ///
    /// * `store` - The result store
    /// * `preload_limit` - Above this many stored records, identifiers are not
    ///   loaded into memory and near-duplicate detection is off
    pub fn load<S: ResultStore>(store: &S, preload_limit: u64) -> StorageResult<Self> {
        let stored = store.count()?;

        if stored > preload_limit {
            tracing::info!(
                "{} stored records exceed preload limit {}; checking duplicates against the store",
                stored,
                preload_limit
            );
            return Ok(Self {
                keys: KeySet::StoreBacked,
            });
        }

        let mut dedup = Self::empty();
        for record in store.iterate() {
            dedup.remember(&record?);
        }

        tracing::debug!("Preloaded {} stored record identifiers", stored);
        Ok(dedup)
    }

    /// A deduplicator that has seen nothing
    pub fn empty() -> Self {
        Self {
            keys: KeySet::Preloaded {
                ids: HashSet::new(),
                fingerprints: HashMap::new(),
            },
        }
    }

    /// Classifies a record against everything stored or remembered
    pub fn check<S: ResultStore + ?Sized>(
        &self,
        store: &S,
        record: &BusinessRecord,
    ) -> StorageResult<Verdict> {
        match &self.keys {
            KeySet::Preloaded { ids, fingerprints } => {
                if ids.contains(&record.id) {
                    return Ok(Verdict::Duplicate);
                }

                let similar = fingerprint(record)
                    .and_then(|fp| fingerprints.get(&fp))
                    .filter(|of| **of != record.id);

                Ok(match similar {
                    Some(of) => Verdict::NearDuplicate { of: of.clone() },
                    None => Verdict::New,
                })
            }
            KeySet::StoreBacked => {
                if store.contains(&record.id)? {
                    Ok(Verdict::Duplicate)
                } else {
                    Ok(Verdict::New)
                }
            }
        }
    }

    /// Returns true if the record is not stored yet
    pub fn is_new<S: ResultStore + ?Sized>(
        &self,
        store: &S,
        record: &BusinessRecord,
    ) -> StorageResult<bool> {
        Ok(self.check(store, record)?.is_new())
    }

    /// Records that `record` has been stored
    pub fn remember(&mut self, record: &BusinessRecord) {
        if let KeySet::Preloaded { ids, fingerprints } = &mut self.keys {
            ids.insert(record.id.clone());
            if let Some(fp) = fingerprint(record) {
                fingerprints.entry(fp).or_insert_with(|| record.id.clone());
            }
        }
    }

    /// Number of identifiers held in memory, or `None` when store-backed
    pub fn known(&self) -> Option<usize> {
        match &self.keys {
            KeySet::Preloaded { ids, .. } => Some(ids.len()),
            KeySet::StoreBacked => None,
        }
    }
}
