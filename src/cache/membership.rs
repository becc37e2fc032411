use crate::core::{ParentId, ProspectId, Result};
use crate::storage::{LocalStore, StorageNamespace, read_local, write_local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MEMBERSHIP_KEY: &str = "prospect-groups";

/// `parent -> [prospect id]`, in link order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipIndex {
    groups: BTreeMap<ParentId, Vec<ProspectId>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: &dyn LocalStore, namespace: &StorageNamespace) -> Result<Self> {
        read_local(store, &namespace.key(MEMBERSHIP_KEY), Self::default())
    }

    pub fn save(&self, store: &dyn LocalStore, namespace: &StorageNamespace) -> Result<()> {
        write_local(store, &namespace.key(MEMBERSHIP_KEY), self)
    }

    pub fn members(&self, parent: &ParentId) -> &[ProspectId] {
        self.groups.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, parent: &ParentId, id: &ProspectId) -> bool {
        self.members(parent).contains(id)
    }

    pub fn groups_of(&self, id: &ProspectId) -> Vec<ParentId> {
        self.groups
            .iter()
            .filter(|(_, members)| members.contains(id))
            .map(|(parent, _)| parent.clone())
            .collect()
    }

    /// Returns false if the id was already linked.
    pub fn link(&mut self, parent: &ParentId, id: &ProspectId) -> bool {
        let members = self.groups.entry(parent.clone()).or_default();
        if members.contains(id) {
            return false;
        }
        members.push(id.clone());
        true
    }

    pub fn unlink(&mut self, parent: &ParentId, id: &ProspectId) -> bool {
        let Some(members) = self.groups.get_mut(parent) else {
            return false;
        };
        let before = members.len();
        members.retain(|member| member != id);
        let removed = members.len() != before;
        if members.is_empty() {
            self.groups.remove(parent);
        }
        removed
    }

    /// Replaces the members of one parent, e.g. after refetching its view.
    pub fn replace_members(&mut self, parent: &ParentId, ids: Vec<ProspectId>) {
        if ids.is_empty() {
            self.groups.remove(parent);
        } else {
            self.groups.insert(parent.clone(), ids);
        }
    }

    /// Unlinks the id from every parent, returning the parents it left.
    pub fn remove_everywhere(&mut self, id: &ProspectId) -> Vec<ParentId> {
        let parents = self.groups_of(id);
        for parent in &parents {
            self.unlink(parent, id);
        }
        parents
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
