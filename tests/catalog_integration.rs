//! End-to-end checks over the public API: concurrent writers on one catalog,
//! and the JSON shape callers consume.
//!
//! Run with: cargo test --test catalog_integration

use hierarchy::closure::integrity;
use hierarchy::models::{NewNote, NewPlace, NoteType, PlaceLevel, PlaceWithClosure};
use hierarchy::models::AccountPlaceRoleType;
use hierarchy::{CatalogStorage, HierarchyKind, HubConfig, NodeId};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

async fn create_storage() -> (Arc<CatalogStorage>, TempDir) {
    let dir = tempdir().unwrap();
    let config = HubConfig {
        db_path: dir.path().join("integration.db"),
        max_connections: 4,
        ..Default::default()
    };
    (Arc::new(CatalogStorage::new(&config).await.unwrap()), dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_moves_keep_closure_consistent() {
    let (storage, _dir) = create_storage().await;

    let mut regions = Vec::new();
    for name in ["North", "South", "East"] {
        let region = storage
            .place_create(NewPlace::new(name, PlaceLevel::Region), None)
            .await
            .unwrap();
        regions.push(region.id);
    }

    let mut cities = Vec::new();
    for i in 0..9 {
        let city = storage
            .place_create(
                NewPlace::new(format!("City {}", i), PlaceLevel::City),
                Some(regions[i % regions.len()]),
            )
            .await
            .unwrap();
        storage
            .place_create(
                NewPlace::new(format!("Quarter {}", i), PlaceLevel::Neighborhood),
                Some(city.id),
            )
            .await
            .unwrap();
        cities.push(city.id);
    }

    let mut handles = Vec::new();
    for (i, city) in cities.iter().copied().enumerate() {
        let storage = storage.clone();
        let target = regions[(i + 1) % regions.len()];
        handles.push(tokio::spawn(async move {
            storage.place_move(city, Some(target)).await
        }));
    }
    // Note writes share the pool with the place moves
    let note_storage = storage.clone();
    handles.push(tokio::spawn(async move {
        let root = note_storage
            .note_create(NewNote::new(1, 1, NoteType::PublicChat), None)
            .await?;
        note_storage
            .note_create(NewNote::new(2, 2, NoteType::Reply), Some(root.id))
            .await?;
        Ok::<(), hierarchy::CatalogError>(())
    }));

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let edges = storage.place_hierarchy().edges().await.unwrap();
    assert!(integrity::check(&edges).is_empty());

    for (i, city) in cities.iter().enumerate() {
        let up = storage.place_ancestors(*city).await.unwrap();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].record.id, regions[(i + 1) % regions.len()]);
    }

    // 3 regions each hold 3 cities and their quarters
    for region in &regions {
        assert_eq!(storage.place_get(*region).await.unwrap().descendants.len(), 6);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_writers_never_hit_a_locked_database() {
    let (storage, _dir) = create_storage().await;

    let west = storage
        .place_create(NewPlace::new("West", PlaceLevel::Region), None)
        .await
        .unwrap()
        .id;
    let east = storage
        .place_create(NewPlace::new("East", PlaceLevel::Region), None)
        .await
        .unwrap()
        .id;
    let chat = storage
        .note_create(NewNote::new(1, 1, NoteType::PublicChat), None)
        .await
        .unwrap()
        .id;

    let mut handles = Vec::new();
    for task in 0..12i64 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            let city = storage
                .place_create(NewPlace::new(format!("Town {}", task), PlaceLevel::City), Some(west))
                .await?
                .id;
            for round in 0..15i64 {
                let target = if round % 2 == 0 { east } else { west };
                storage.place_move(city, Some(target)).await?;
                storage
                    .place_role_assign(task, city, AccountPlaceRoleType::Inhabitant, round % 3 == 0)
                    .await?;
                storage.chat_join(task, chat).await?;
                let reply = storage
                    .note_create(NewNote::new(task, round, NoteType::Reply).reposting(chat), Some(chat))
                    .await?;
                storage.chat_mark_read(task, chat, reply.id).await?;
            }
            Ok::<NodeId, hierarchy::CatalogError>(city)
        }));
    }

    let mut cities = Vec::new();
    for handle in handles {
        cities.push(handle.await.unwrap().unwrap());
    }

    // The last of the 15 rounds moves every town under `east`
    for city in &cities {
        assert_eq!(storage.place_hierarchy().parent(*city).await.unwrap(), Some(east));
    }
    assert_eq!(storage.note_get(chat).await.unwrap().descendants.len(), 12 * 15);
    assert_eq!(storage.chat_members(chat).await.unwrap().len(), 12);

    for kind in [HierarchyKind::Place, HierarchyKind::Note] {
        let edges = storage.hierarchy(kind).edges().await.unwrap();
        assert!(integrity::check(&edges).is_empty());
    }
}

#[tokio::test]
async fn hierarchy_edits_keep_records_and_closure_in_step() {
    let (storage, _dir) = create_storage().await;

    let region = storage
        .place_create(NewPlace::new("Minho", PlaceLevel::Region), None)
        .await
        .unwrap()
        .id;
    let city = storage
        .place_create(NewPlace::new("Braga", PlaceLevel::City), Some(region))
        .await
        .unwrap()
        .id;

    // Linking an id with no record must not claim it
    let err = storage
        .link(HierarchyKind::Place, NodeId::new(city.get() + 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, hierarchy::CatalogError::NotFound { .. }));
    let next = storage
        .place_create(NewPlace::new("Guimarães", PlaceLevel::City), Some(region))
        .await
        .unwrap()
        .id;
    assert_eq!(next, NodeId::new(city.get() + 1));

    // Deleting drops the record together with its closure rows
    storage.place_delete(city, true).await.unwrap();
    assert!(storage.place_get(city).await.is_err());
    assert!(!storage.place_hierarchy().contains(city).await.unwrap());

    let records = storage.place_roots().await.unwrap().len()
        + storage.place_get(region).await.unwrap().descendants.len();
    assert_eq!(storage.place_hierarchy().len().await.unwrap(), records);
}

#[tokio::test]
async fn decorated_place_json_is_flat() {
    let (storage, _dir) = create_storage().await;

    let region = storage
        .place_create(NewPlace::new("Algarve", PlaceLevel::Region), None)
        .await
        .unwrap();
    let city = storage
        .place_create(
            NewPlace::new("Faro", PlaceLevel::City).with_coordinates(37.02, -7.93),
            Some(region.id),
        )
        .await
        .unwrap();

    let place = storage.place_get(region.id).await.unwrap();
    let json = serde_json::to_value(&place).unwrap();

    let child = &json["descendants"][0];
    assert_eq!(child["id"], serde_json::json!(city.id));
    assert_eq!(child["name"], "Faro");
    assert_eq!(child["level"], "city");
    assert_eq!(child["ancestor_id"], serde_json::json!(region.id));
    assert_eq!(child["descendant_id"], serde_json::json!(city.id));
    assert_eq!(child["depth"], 1);

    let decoded: PlaceWithClosure = serde_json::from_value(child.clone()).unwrap();
    assert_eq!(decoded.record.id, city.id);
    assert_eq!(decoded.edge().ancestor_id, region.id);
}

#[test]
fn decorated_schema_lists_closure_fields() {
    let schema = schemars::schema_for!(PlaceWithClosure);
    let schema_value = serde_json::to_value(&schema).unwrap();

    let properties = schema_value.get("properties").expect("Should have properties");
    for field in ["ancestor_id", "descendant_id", "depth"] {
        assert!(properties.get(field).is_some(), "missing {} in schema", field);
    }

    // Place fields are flattened in, possibly by reference for the recursive part
    let text = schema_value.to_string();
    assert!(text.contains("\"level\""));
    assert!(text.contains("\"hashtags\""));
}

#[tokio::test]
async fn missing_records_report_their_kind() {
    let (storage, _dir) = create_storage().await;

    let err = storage.place_get(NodeId::new(5)).await.unwrap_err();
    assert_eq!(err.to_string(), "Place not found: 5");

    let err = storage.note_get(NodeId::new(6)).await.unwrap_err();
    assert_eq!(err.to_string(), "Note not found: 6");
}
