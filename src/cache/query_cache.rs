use crate::core::{ParentId, Prospect, ProspectId, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Logical query a cached prospect list answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Every prospect the user can see.
    All,
    /// Prospects linked to one parent.
    Group(ParentId),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("prospects"),
            Self::Group(parent) => write!(f, "prospects/group/{}", parent),
        }
    }
}

/// Keyed prospect lists.
///
/// Lists are never mutated in place: every change installs a new `Arc`, so
/// consumers can detect updates with `Arc::ptr_eq`.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<CacheKey, Arc<Vec<Prospect>>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<Arc<Vec<Prospect>>>> {
        let entries = self.entries.read()?;
        Ok(entries.get(key).cloned())
    }

    pub fn set(&self, key: CacheKey, prospects: Vec<Prospect>) -> Result<Arc<Vec<Prospect>>> {
        let shared = Arc::new(prospects);
        let mut entries = self.entries.write()?;
        entries.insert(key, shared.clone());
        Ok(shared)
    }

    /// Drops the entry; returns whether one was present.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let mut entries = self.entries.write()?;
        Ok(entries.remove(key).is_some())
    }

    pub fn keys(&self) -> Result<Vec<CacheKey>> {
        let entries = self.entries.read()?;
        Ok(entries.keys().cloned().collect())
    }

    /// Every cached copy of the prospect, one per list that holds it.
    pub fn copies_of(&self, id: &ProspectId) -> Result<Vec<(CacheKey, Prospect)>> {
        let entries = self.entries.read()?;
        Ok(entries
            .iter()
            .filter_map(|(key, list)| {
                list.iter()
                    .find(|prospect| &prospect.id == id)
                    .map(|prospect| (key.clone(), prospect.clone()))
            })
            .collect())
    }

    /// First cached copy, preferring the collection-wide list.
    pub fn find(&self, id: &ProspectId) -> Result<Option<Prospect>> {
        if let Some(all) = self.get(&CacheKey::All)? {
            if let Some(found) = all.iter().find(|prospect| &prospect.id == id) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(self.copies_of(id)?.into_iter().map(|(_, prospect)| prospect).next())
    }

    /// Runs `edit` over every entry with the write lock held; an entry is
    /// replaced only when `edit` returns a new list.
    pub(crate) fn rewrite<F>(&self, mut edit: F) -> Result<()>
    where
        F: FnMut(&CacheKey, &[Prospect]) -> Option<Vec<Prospect>>,
    {
        let mut entries = self.entries.write()?;
        for (key, list) in entries.iter_mut() {
            if let Some(next) = edit(key, list.as_slice()) {
                *list = Arc::new(next);
            }
        }
        Ok(())
    }
}
