//! Property-based tests for ordering, serialization and convergence.

use eddy_engine::{
    Collaborators, EngineConfig, FavoriteEntity, FavoritesSnapshot, FavoritesStore, GeoLocation,
    ManualClock, ManualConnectivity, MemoryKv, MemoryNameResolver, MemoryRemoteStore,
    NewFavorite, PendingLog, PendingOperation,
};
use proptest::prelude::*;
use std::sync::Arc;

const STATIONS: [&str; 6] = ["s0", "s1", "s2", "s3", "s4", "s5"];

#[derive(Debug, Clone)]
enum Action {
    Add(usize),
    Delete(usize),
    Reorder(usize, usize),
    Rename(usize, String),
    ToggleNetwork,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (0..STATIONS.len()).prop_map(Action::Add),
        2 => (0..STATIONS.len()).prop_map(Action::Delete),
        2 => (0usize..8, 0usize..8).prop_map(|(a, b)| Action::Reorder(a, b)),
        1 => (0..STATIONS.len(), "[A-Z][a-z ]{0,20}").prop_map(|(i, n)| Action::Rename(i, n)),
        1 => Just(Action::ToggleNetwork),
    ]
}

const USERS: [&str; 2] = ["u1", "u2"];

#[derive(Debug, Clone)]
enum UserAction {
    Add(usize, usize),
    Delete(usize, usize),
    Reorder(usize, usize),
}

fn user_action() -> impl Strategy<Value = UserAction> {
    prop_oneof![
        4 => (0..USERS.len(), 0..STATIONS.len()).prop_map(|(u, s)| UserAction::Add(u, s)),
        2 => (0..USERS.len(), 0..STATIONS.len()).prop_map(|(u, s)| UserAction::Delete(u, s)),
        2 => (0usize..8, 0usize..8).prop_map(|(a, b)| UserAction::Reorder(a, b)),
    ]
}

fn name() -> impl Strategy<Value = String> {
    "[A-Z][a-z ]{0,20}"
}

fn source_name() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("null".to_string())),
        Just(Some(String::new())),
        name().prop_map(Some),
    ]
}

fn geo() -> impl Strategy<Value = GeoLocation> {
    (
        proptest::option::of(-90.0f64..90.0),
        proptest::option::of(-180.0f64..180.0),
        proptest::option::of(-100.0f64..5_000.0),
        proptest::option::of(name()),
        proptest::option::of("[A-Z]{2}"),
    )
        .prop_map(|(lat, lon, elevation, city, state)| GeoLocation {
            lat,
            lon,
            elevation,
            city,
            state,
        })
}

fn entity() -> impl Strategy<Value = FavoriteEntity> {
    (
        "[a-z0-9-]{1,12}",
        "[0-9]{8}",
        0u32..50,
        name(),
        source_name(),
        proptest::option::of(name()),
        0u32..8,
        proptest::option::of("/[a-z]{1,10}\\.jpg"),
        0u64..2_000_000_000_000,
        geo(),
    )
        .prop_map(
            |(user, station, position, display, source, description, image, custom, updated, geo)| {
                let mut favorite = FavoriteEntity::new(user, station, display, position, updated)
                    .with_description(description)
                    .with_image_index(image)
                    .with_geo(geo);
                favorite.original_source_name = source;
                favorite.custom_image_path = custom;
                favorite
            },
        )
}

/// What a reader should get back: the sentinel maps to no source name.
fn normalized(mut favorite: FavoriteEntity) -> FavoriteEntity {
    favorite.original_source_name =
        eddy_engine::entity::decode_source_name(favorite.original_source_name);
    favorite
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

struct Harness {
    store: FavoritesStore,
    remote: Arc<MemoryRemoteStore>,
    net: Arc<ManualConnectivity>,
    clock: Arc<ManualClock>,
}

fn harness(connected: bool) -> Harness {
    let remote = Arc::new(MemoryRemoteStore::new());
    let net = Arc::new(ManualConnectivity::new(connected));
    let clock = Arc::new(ManualClock::new(1_000));
    let store = FavoritesStore::new(
        Collaborators {
            remote: remote.clone(),
            connectivity: net.clone(),
            storage: Arc::new(MemoryKv::new()),
            names: Arc::new(MemoryNameResolver::new()),
            clock: clock.clone(),
        },
        EngineConfig::default(),
    );
    Harness {
        store,
        remote,
        net,
        clock,
    }
}

/// Apply an action, ignoring expected rejections such as unknown stations.
async fn apply(h: &Harness, action: &Action) {
    h.clock.advance(1);
    let result = match action {
        Action::Add(i) => {
            h.store
                .add_favorite(NewFavorite::new("u", STATIONS[*i]).with_display_name(STATIONS[*i]))
                .await
        }
        Action::Delete(i) => h.store.delete_favorite("u", STATIONS[*i]).await,
        Action::Reorder(old, new) => h.store.reorder(*old, *new).await,
        Action::Rename(i, name) => h.store.rename_favorite("u", STATIONS[*i], name).await,
        Action::ToggleNetwork => {
            h.net.set_connected(!h.store.is_online());
            Ok(())
        }
    };
    result.ok();
}

async fn apply_for_user(h: &Harness, action: &UserAction) {
    h.clock.advance(1);
    let result = match action {
        UserAction::Add(u, i) => {
            h.store
                .add_favorite(NewFavorite::new(USERS[*u], STATIONS[*i]).with_display_name(STATIONS[*i]))
                .await
        }
        UserAction::Delete(u, i) => h.store.delete_favorite(USERS[*u], STATIONS[*i]).await,
        UserAction::Reorder(old, new) => h.store.reorder(*old, *new).await,
    };
    result.ok();
}

fn summary(list: Vec<FavoriteEntity>) -> Vec<(String, u32, String)> {
    list.into_iter()
        .map(|f| (f.station_id, f.position, f.display_name))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn positions_stay_contiguous(actions in proptest::collection::vec(action(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let h = harness(true);
            for action in &actions {
                apply(&h, action).await;
                let favorites = h.store.favorites();
                for (index, favorite) in favorites.iter().enumerate() {
                    prop_assert_eq!(favorite.position as usize, index);
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn positions_stay_contiguous_per_user(actions in proptest::collection::vec(user_action(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let h = harness(true);
            for action in &actions {
                apply_for_user(&h, action).await;

                let current = h.store.current_user();
                for (index, favorite) in h.store.favorites().iter().enumerate() {
                    prop_assert_eq!(Some(&favorite.user_id), current.as_ref());
                    prop_assert_eq!(favorite.position as usize, index);
                }
                for user in USERS {
                    for (index, favorite) in h.remote.records(user).iter().enumerate() {
                        prop_assert_eq!(favorite.position as usize, index);
                    }
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn offline_session_converges(actions in proptest::collection::vec(action(), 1..30)) {
        let rt = runtime();
        rt.block_on(async {
            let h = harness(false);
            for action in actions.iter().filter(|a| !matches!(a, Action::ToggleNetwork)) {
                apply(&h, action).await;
            }

            h.net.set_connected(true);
            let report = h.store.sync_pending_operations().await.unwrap();
            prop_assert_eq!(report.remaining(), 0);
            prop_assert_eq!(
                summary(h.remote.records("u")),
                summary(h.store.favorites())
            );
            Ok(())
        })?;
    }

    #[test]
    fn entity_roundtrip(favorite in entity()) {
        let json = serde_json::to_string(&favorite).unwrap();
        let parsed: FavoriteEntity = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, normalized(favorite));
    }

    #[test]
    fn snapshot_roundtrip(favorites in proptest::collection::vec(entity(), 0..10)) {
        let snapshot = FavoritesSnapshot::new("u", &favorites, 42);
        let parsed = FavoritesSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();

        let mut expected: Vec<FavoriteEntity> = favorites.into_iter().map(normalized).collect();
        expected.sort_by_key(|f| f.position);
        let mut restored = parsed.into_favorites();
        restored.sort_by_key(|f| f.position);
        prop_assert_eq!(
            restored.iter().map(|f| f.position).collect::<Vec<_>>(),
            expected.iter().map(|f| f.position).collect::<Vec<_>>()
        );
        for favorite in &restored {
            prop_assert!(expected.contains(favorite));
        }
    }

    #[test]
    fn pending_log_roundtrip(favorites in proptest::collection::vec(entity(), 0..10)) {
        let operations: Vec<PendingOperation> = favorites
            .into_iter()
            .enumerate()
            .map(|(i, f)| match i % 4 {
                0 => PendingOperation::add(f, i as u64),
                1 => PendingOperation::update(f, i as u64),
                2 => PendingOperation::delete(f, i as u64),
                _ => PendingOperation::reorder(i as u64),
            })
            .collect();
        let log = PendingLog::new(operations.clone());
        let parsed = PendingLog::from_json(&log.to_json().unwrap()).unwrap();

        let expected: Vec<PendingOperation> = operations
            .into_iter()
            .map(|mut op| {
                op.favorite_snapshot = op.favorite_snapshot.map(normalized);
                op
            })
            .collect();
        prop_assert_eq!(parsed.operations, expected);
    }
}
