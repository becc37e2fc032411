use prospect_sync::cache::MEMBERSHIP_KEY;
use prospect_sync::storage::read_local;
use prospect_sync::{
    CacheKey, EditSynchronizer, FieldPatch, FileStore, LocalBackend, LocalPersistence,
    MembershipIndex, ParentId, PersistenceBackend, PersistenceMode, Prospect, QueueMode,
    StorageNamespace, SyncConfig, fields,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn acme() -> FieldPatch {
    FieldPatch::new()
        .with(fields::NAME, json!("Acme"))
        .with(fields::STATUS, json!("prospect"))
}

#[tokio::test]
async fn test_created_prospect_reads_back_from_local_store() {
    let dir = TempDir::new().unwrap();
    let sync = EditSynchronizer::from_config(SyncConfig::demo().data_dir(dir.path())).unwrap();
    assert_eq!(sync.dispatcher().mode(), PersistenceMode::Demo);

    let created = sync.create(acme(), Vec::new()).await.unwrap();
    assert!(!created.id.as_str().is_empty());

    let store = FileStore::open(dir.path()).unwrap();
    let stored: Vec<Prospect> = read_local(&store, "prospects:device", Vec::new()).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, created.id);
    assert_eq!(stored[0].name, "Acme");
    assert_eq!(stored[0].status, "prospect");

    let backend = LocalBackend::new(
        LocalPersistence {
            store: Arc::new(store),
            namespace: StorageNamespace::device(),
        },
        "prospects",
    );
    assert_eq!(backend.fetch_one(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn test_edits_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let config = SyncConfig::demo().data_dir(dir.path()).user_id("broker-7");

    let id = {
        let sync = EditSynchronizer::from_config(config.clone()).unwrap();
        let created = sync.create(acme(), Vec::new()).await.unwrap();
        sync.select(created.clone()).unwrap();
        sync.queue_update(fields::NOTES, json!("owner wants to sell"), QueueMode::Debounced)
            .await
            .unwrap();
        sync.shutdown().await.unwrap();
        created.id
    };

    let sync = EditSynchronizer::from_config(config).unwrap();
    let reloaded = sync.select_by_id(&id).await.unwrap();
    assert_eq!(reloaded.notes.as_deref(), Some("owner wants to sell"));
    assert!(reloaded.updated_at.is_some());
}

#[tokio::test]
async fn test_users_do_not_share_demo_data() {
    let dir = TempDir::new().unwrap();
    let first =
        EditSynchronizer::from_config(SyncConfig::demo().data_dir(dir.path()).user_id("a")).unwrap();
    let second =
        EditSynchronizer::from_config(SyncConfig::demo().data_dir(dir.path()).user_id("b")).unwrap();

    tokio_test::assert_ok!(first.create(acme(), Vec::new()).await);

    assert_eq!(first.load(CacheKey::All).await.unwrap().len(), 1);
    assert!(second.load(CacheKey::All).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_group_membership_is_persisted_and_filters_loads() {
    let dir = TempDir::new().unwrap();
    let config = SyncConfig::demo().data_dir(dir.path());
    let workspace = ParentId::new("ws-1");

    let sync = EditSynchronizer::from_config(config.clone()).unwrap();
    let linked = sync.create(acme(), vec![workspace.clone()]).await.unwrap();
    let other = sync
        .create(FieldPatch::new().with(fields::NAME, json!("Elsewhere")), Vec::new())
        .await
        .unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    let index: MembershipIndex = read_local(
        &store,
        &StorageNamespace::device().key(MEMBERSHIP_KEY),
        MembershipIndex::new(),
    )
    .unwrap();
    assert!(index.contains(&workspace, &linked.id));
    assert!(!index.contains(&workspace, &other.id));

    let restarted = EditSynchronizer::from_config(config).unwrap();
    let group = restarted.load(CacheKey::Group(workspace)).await.unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(group[0].id, linked.id);
}

#[tokio::test]
async fn test_follow_up_date_is_derived_on_create() {
    let sync = EditSynchronizer::from_config(SyncConfig::demo()).unwrap();
    let created = sync
        .create(
            acme().with(fields::FOLLOW_UP_TIMEFRAME, json!("1_month")),
            Vec::new(),
        )
        .await
        .unwrap();

    let created_at = created.created_at.unwrap();
    let due = created.follow_up_date.unwrap();
    let days = (due - created_at).num_days();
    assert!((27..=31).contains(&days), "follow-up {} days out", days);
}

#[tokio::test]
async fn test_user_named_device_is_kept_apart_from_device_data() {
    let dir = TempDir::new().unwrap();
    let device = EditSynchronizer::from_config(SyncConfig::demo().data_dir(dir.path())).unwrap();
    let user = EditSynchronizer::from_config(
        SyncConfig::demo().data_dir(dir.path()).user_id("device"),
    )
    .unwrap();

    tokio_test::assert_ok!(device.create(acme(), Vec::new()).await);

    assert_eq!(device.load(CacheKey::All).await.unwrap().len(), 1);
    assert!(user.load(CacheKey::All).await.unwrap().is_empty());
}
