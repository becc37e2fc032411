use super::{LocalPersistence, PersistenceBackend, ProspectFilter};
use crate::cache::MembershipIndex;
use crate::config::PersistenceMode;
use crate::core::{FieldPatch, Prospect, ProspectId, Result, SyncError, fields};
use crate::storage::{read_local, write_local};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Mutex;
use tracing::debug;

/// Demo-mode backend: the whole collection lives under one namespaced key.
pub struct LocalBackend {
    local: LocalPersistence,
    collection_key: String,
    // Serializes read-modify-write cycles on the collection key.
    write_lock: Mutex<()>,
}

impl LocalBackend {
    pub fn new(local: LocalPersistence, collection: &str) -> Self {
        let collection_key = local.namespace.key(collection);
        Self {
            local,
            collection_key,
            write_lock: Mutex::new(()),
        }
    }

    pub fn collection_key(&self) -> &str {
        &self.collection_key
    }

    fn load(&self) -> Result<Vec<Prospect>> {
        read_local(self.local.store.as_ref(), &self.collection_key, Vec::new())
    }

    fn store(&self, prospects: &[Prospect]) -> Result<()> {
        write_local(self.local.store.as_ref(), &self.collection_key, prospects)
    }
}

#[async_trait]
impl PersistenceBackend for LocalBackend {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Demo
    }

    async fn fetch_one(&self, id: &ProspectId) -> Result<Prospect> {
        self.load()?
            .into_iter()
            .find(|prospect| &prospect.id == id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    async fn fetch_many(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>> {
        let prospects = self.load()?;
        let index = match &filter.parent {
            Some(_) => Some(MembershipIndex::load(
                self.local.store.as_ref(),
                &self.local.namespace,
            )?),
            None => None,
        };

        Ok(prospects
            .into_iter()
            .filter(|prospect| filter.matches_status(prospect))
            .filter(|prospect| match (&filter.parent, &index) {
                (Some(parent), Some(index)) => index.contains(parent, &prospect.id),
                _ => true,
            })
            .collect())
    }

    async fn create(&self, payload: &FieldPatch) -> Result<Prospect> {
        let _guard = self.write_lock.lock()?;
        let now = Utc::now();

        let mut payload = payload.clone();
        payload.remove(fields::ID);
        payload.set(fields::CREATED_AT, Value::String(now.to_rfc3339()));
        payload.set(fields::UPDATED_AT, Value::String(now.to_rfc3339()));
        let created = Prospect::from_payload(ProspectId::generate(), &payload)?;

        let mut prospects = self.load()?;
        prospects.push(created.clone());
        self.store(&prospects)?;

        debug!(prospect_id = %created.id, key = %self.collection_key, "demo prospect created");
        Ok(created)
    }

    async fn update(&self, id: &ProspectId, patch: &FieldPatch) -> Result<Prospect> {
        let _guard = self.write_lock.lock()?;
        let mut prospects = self.load()?;
        let slot = prospects
            .iter_mut()
            .find(|prospect| &prospect.id == id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        let mut merged = slot.apply_patch(patch)?;
        merged.updated_at = Some(Utc::now());
        *slot = merged.clone();
        self.store(&prospects)?;

        debug!(prospect_id = %id, fields = ?patch.field_names(), "demo prospect updated");
        Ok(merged)
    }

    async fn delete(&self, id: &ProspectId) -> Result<()> {
        let _guard = self.write_lock.lock()?;
        let mut prospects = self.load()?;
        let before = prospects.len();
        prospects.retain(|prospect| &prospect.id != id);
        if prospects.len() == before {
            return Err(SyncError::NotFound(id.to_string()));
        }
        self.store(&prospects)?;

        debug!(prospect_id = %id, "demo prospect deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParentId;
    use crate::storage::{MemoryStore, StorageNamespace};
    use serde_json::json;
    use std::sync::Arc;

    fn backend(namespace: StorageNamespace) -> (LocalBackend, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let local = LocalPersistence {
            store: store.clone(),
            namespace,
        };
        (LocalBackend::new(local, "prospects"), store)
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_persists() {
        let (backend, store) = backend(StorageNamespace::for_user("broker-7"));
        let created = backend
            .create(
                &FieldPatch::new()
                    .with(fields::NAME, json!("Acme"))
                    .with(fields::STATUS, json!("prospect")),
            )
            .await
            .unwrap();

        assert!(!created.id.as_str().is_empty());
        assert!(created.created_at.is_some());

        let stored: Vec<Prospect> = read_local(store.as_ref(), "prospects:user:broker-7", Vec::new()).unwrap();
        assert_eq!(stored, vec![created]);
    }

    #[tokio::test]
    async fn test_update_merges_and_missing_is_not_found() {
        let (backend, _) = backend(StorageNamespace::device());
        let created = backend
            .create(&FieldPatch::new().with(fields::NAME, json!("Acme")))
            .await
            .unwrap();

        let updated = backend
            .update(&created.id, &FieldPatch::new().with(fields::NOTES, json!("gate code 1234")))
            .await
            .unwrap();
        assert_eq!(updated.name, "Acme");
        assert_eq!(updated.notes.as_deref(), Some("gate code 1234"));
        assert_eq!(backend.fetch_one(&created.id).await.unwrap(), updated);

        let err = backend
            .update(&ProspectId::new("nope"), &FieldPatch::new().with(fields::NAME, json!("x")))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_many_filters_by_group_and_status() {
        let (backend, store) = backend(StorageNamespace::device());
        let a = backend
            .create(&FieldPatch::new().with(fields::NAME, json!("A")))
            .await
            .unwrap();
        let b = backend
            .create(
                &FieldPatch::new()
                    .with(fields::NAME, json!("B"))
                    .with(fields::STATUS, json!("listing")),
            )
            .await
            .unwrap();

        let mut index = MembershipIndex::new();
        index.link(&ParentId::new("ws"), &b.id);
        index.save(store.as_ref(), &StorageNamespace::device()).unwrap();

        let grouped = backend.fetch_many(&ProspectFilter::in_group("ws")).await.unwrap();
        assert_eq!(grouped, vec![b.clone()]);

        let listings = backend
            .fetch_many(&ProspectFilter::all().with_status("listing"))
            .await
            .unwrap();
        assert_eq!(listings, vec![b]);

        assert_eq!(backend.fetch_many(&ProspectFilter::all()).await.unwrap().len(), 2);
        backend.delete(&a.id).await.unwrap();
        assert_eq!(backend.fetch_many(&ProspectFilter::all()).await.unwrap().len(), 1);
    }
}
