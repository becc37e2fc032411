use super::{CacheKey, MembershipIndex, QueryCache};
use crate::backend::LocalPersistence;
use crate::core::{ParentId, Prospect, ProspectId, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// A change to one prospect that every cached view must reflect.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Created {
        prospect: Prospect,
        groups: Vec<ParentId>,
    },
    Updated(Prospect),
    Deleted(ProspectId),
    Linked {
        parent: ParentId,
        prospect: Prospect,
    },
    Unlinked {
        parent: ParentId,
        id: ProspectId,
    },
}

/// Keeps the collection-wide list, grouped lists and the membership index in
/// agreement.
pub struct CacheReconciler {
    cache: Arc<QueryCache>,
    membership: Mutex<MembershipIndex>,
    local: Option<LocalPersistence>,
}

impl CacheReconciler {
    /// In-memory index only.
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self {
            cache,
            membership: Mutex::new(MembershipIndex::new()),
            local: None,
        }
    }

    /// Loads and persists the membership index through the local store.
    pub fn with_local(cache: Arc<QueryCache>, local: LocalPersistence) -> Result<Self> {
        let index = MembershipIndex::load(local.store.as_ref(), &local.namespace)?;
        Ok(Self {
            cache,
            membership: Mutex::new(index),
            local: Some(local),
        })
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn membership(&self) -> Result<MembershipIndex> {
        Ok(self.membership.lock()?.clone())
    }

    /// Installs a freshly fetched list; a group list also defines that
    /// group's membership.
    pub fn hydrate(&self, key: CacheKey, prospects: Vec<Prospect>) -> Result<Arc<Vec<Prospect>>> {
        let mut membership = self.membership.lock()?;
        if let CacheKey::Group(parent) = &key {
            let ids = prospects.iter().map(|prospect| prospect.id.clone()).collect();
            membership.replace_members(parent, ids);
            self.persist(&membership)?;
        }
        self.cache.set(key, prospects)
    }

    pub fn apply(&self, event: CacheEvent) -> Result<()> {
        let mut membership = self.membership.lock()?;

        match event {
            CacheEvent::Created { prospect, groups } => {
                for parent in &groups {
                    membership.link(parent, &prospect.id);
                }
                self.cache.rewrite(|key, list| {
                    let relevant = match key {
                        CacheKey::All => true,
                        CacheKey::Group(parent) => groups.contains(parent),
                    };
                    relevant.then(|| upsert(list, &prospect))
                })?;
                if !groups.is_empty() {
                    self.persist(&membership)?;
                }
                debug!(prospect_id = %prospect.id, groups = groups.len(), "cache reconciled create");
            }
            CacheEvent::Updated(prospect) => {
                self.cache.rewrite(|_, list| replace_existing(list, &prospect))?;
                debug!(prospect_id = %prospect.id, "cache reconciled update");
            }
            CacheEvent::Deleted(id) => {
                let left = membership.remove_everywhere(&id);
                self.cache.rewrite(|_, list| remove_existing(list, &id))?;
                if !left.is_empty() {
                    self.persist(&membership)?;
                }
                debug!(prospect_id = %id, "cache reconciled delete");
            }
            CacheEvent::Linked { parent, prospect } => {
                if membership.link(&parent, &prospect.id) {
                    self.persist(&membership)?;
                }
                self.cache.rewrite(|key, list| match key {
                    CacheKey::Group(group) if *group == parent => Some(upsert(list, &prospect)),
                    _ => replace_existing(list, &prospect),
                })?;
            }
            CacheEvent::Unlinked { parent, id } => {
                if membership.unlink(&parent, &id) {
                    self.persist(&membership)?;
                }
                self.cache.rewrite(|key, list| match key {
                    CacheKey::Group(group) if *group == parent => remove_existing(list, &id),
                    _ => None,
                })?;
            }
        }

        Ok(())
    }

    fn persist(&self, membership: &MembershipIndex) -> Result<()> {
        let Some(local) = &self.local else {
            return Ok(());
        };
        membership
            .save(local.store.as_ref(), &local.namespace)
            .inspect_err(|err| warn!(error = %err, "failed to persist prospect membership"))
    }
}

/// Replaces the entry with the same id, or appends.
fn upsert(list: &[Prospect], prospect: &Prospect) -> Vec<Prospect> {
    match replace_existing(list, prospect) {
        Some(next) => next,
        None => {
            let mut next = list.to_vec();
            next.push(prospect.clone());
            next
        }
    }
}

fn replace_existing(list: &[Prospect], prospect: &Prospect) -> Option<Vec<Prospect>> {
    let position = list.iter().position(|entry| entry.id == prospect.id)?;
    let mut next = list.to_vec();
    next[position] = prospect.clone();
    Some(next)
}

fn remove_existing(list: &[Prospect], id: &ProspectId) -> Option<Vec<Prospect>> {
    if !list.iter().any(|entry| &entry.id == id) {
        return None;
    }
    Some(list.iter().filter(|entry| &entry.id != id).cloned().collect())
}
