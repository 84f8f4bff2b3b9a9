use std::sync::atomic::AtomicUsize;

use serde_json::{Value, json};
use tokio::sync::Notify;

use super::*;
use crate::doc::{Coord, Geometry, Shape};
use crate::engine::EngineCore;
use crate::input::Tool;
use crate::services::auth::StaticAuth;
use crate::services::store::MemoryFileStore;

// =============================================================================
// Helpers
// =============================================================================

/// Memory store that counts calls and can hold saves until released.
#[derive(Default)]
struct TestStore {
    inner: MemoryFileStore,
    calls: AtomicUsize,
    saves: AtomicUsize,
    gated: bool,
    gate: Notify,
}

impl TestStore {
    fn gated() -> Self {
        Self { gated: true, ..Self::default() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl FileStore for TestStore {
    async fn list(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        self.hit();
        self.inner.list(owner).await
    }

    async fn save(&self, owner: &str, name: &str, document: &Value) -> Result<(), StoreError> {
        self.hit();
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.gate.notified().await;
        }
        self.inner.save(owner, name, document).await
    }

    async fn load(&self, owner: &str, name: &str) -> Result<Value, StoreError> {
        self.hit();
        self.inner.load(owner, name).await
    }

    async fn delete(&self, owner: &str, name: &str) -> Result<(), StoreError> {
        self.hit();
        self.inner.delete(owner, name).await
    }

    async fn delete_all(&self, owner: &str) -> Result<(), StoreError> {
        self.hit();
        self.inner.delete_all(owner).await
    }

    async fn list_all(&self) -> Result<Vec<DocumentEntry>, StoreError> {
        self.hit();
        self.inner.list_all().await
    }

    async fn delete_everything(&self) -> Result<(), StoreError> {
        self.hit();
        self.inner.delete_everything().await
    }
}

/// Store whose every call fails as if the server were down.
struct DownStore;

#[async_trait::async_trait]
impl FileStore for DownStore {
    async fn list(&self, _owner: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Transport("connection refused".into()))
    }

    async fn save(&self, _owner: &str, _name: &str, _document: &Value) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".into()))
    }

    async fn load(&self, _owner: &str, _name: &str) -> Result<Value, StoreError> {
        Err(StoreError::Transport("connection refused".into()))
    }

    async fn delete(&self, _owner: &str, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".into()))
    }

    async fn delete_all(&self, _owner: &str) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".into()))
    }

    async fn list_all(&self) -> Result<Vec<DocumentEntry>, StoreError> {
        Err(StoreError::Transport("connection refused".into()))
    }

    async fn delete_everything(&self) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".into()))
    }
}

const USER: &str = "user@example.com";
const ADMIN: &str = "admin@example.com";

fn user() -> Arc<dyn AuthService> {
    Arc::new(StaticAuth::signed_in(Identity::new(USER, false)))
}

fn admin() -> Arc<dyn AuthService> {
    Arc::new(StaticAuth::signed_in(Identity::new(ADMIN, true)))
}

fn anonymous() -> Arc<dyn AuthService> {
    Arc::new(StaticAuth::anonymous())
}

fn gateway(store: &Arc<TestStore>, auth: Arc<dyn AuthService>) -> PersistenceGateway {
    PersistenceGateway::new(store.clone(), auth)
}

fn sample_model() -> GeometryModel {
    let mut model = GeometryModel::new();
    model.add_shape(Shape::new(Geometry::Point(Coord::new(10.0, 20.0))));
    model.add_shape(Shape::new(Geometry::LineString(vec![Coord::new(0.0, 0.0), Coord::new(1.0, 0.0)])));
    model.add_shape(Shape::new(Geometry::Polygon(vec![
        Coord::new(0.0, 0.0),
        Coord::new(1.0, 0.0),
        Coord::new(1.0, 1.0),
    ])));
    model
}

fn yes() -> impl Confirm {
    |_: &str| true
}

fn no() -> impl Confirm {
    |_: &str| false
}

// =============================================================================
// save
// =============================================================================

#[tokio::test]
async fn save_requires_identity() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, anonymous());
    let err = gw.save("park", &sample_model()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::AuthRequired));
    assert_eq!(err.error_code(), "E_AUTH_REQUIRED");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn save_rejects_blank_name() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    let err = gw.save("   ", &sample_model()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Validation(ValidationError::EmptyName)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn save_rejects_empty_model() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    let err = gw.save("park", &GeometryModel::new()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Validation(ValidationError::EmptyDocument)));
    assert_eq!(err.error_code(), "E_VALIDATION");
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn save_stores_under_caller_and_refreshes_list() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    let outcome = gw.save(" park ", &sample_model()).await.expect("save");
    assert_eq!(outcome, SaveOutcome::Saved);
    assert_eq!(store.inner.list(USER).await.expect("list"), vec!["park"]);
    assert_eq!(gw.file_list().await, vec!["park"]);
    assert!(!gw.is_saving());
}

#[tokio::test]
async fn concurrent_save_is_dropped() {
    let store = Arc::new(TestStore::gated());
    let gw = gateway(&store, user());
    let model = sample_model();

    let (first, second) = tokio::join!(gw.save("a", &model), async {
        tokio::task::yield_now().await;
        let second = gw.save("b", &model).await;
        store.gate.notify_one();
        second
    });

    assert_eq!(first.expect("first"), SaveOutcome::Saved);
    assert_eq!(second.expect("second"), SaveOutcome::Dropped);
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    assert_eq!(store.inner.list(USER).await.expect("list"), vec!["a"]);
}

#[tokio::test]
async fn failed_save_releases_flight_flag() {
    let gw = PersistenceGateway::new(Arc::new(DownStore), user());
    let err = gw.save("park", &sample_model()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Transport(_)));
    assert!(err.retryable());
    assert!(!gw.is_saving());
    assert!(matches!(gw.save("park", &sample_model()).await, Err(PersistenceError::Transport(_))));
}

// =============================================================================
// load
// =============================================================================

#[tokio::test]
async fn save_then_load_round_trip() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    let model = sample_model();
    gw.save("park", &model).await.expect("save");

    let loaded = gw.load("park").await.expect("load");
    assert_eq!(loaded.owner, USER);
    assert_eq!(loaded.name, "park");
    assert!(loaded.report.skipped.is_empty());
    for (original, restored) in model.iter().zip(&loaded.report.shapes) {
        assert!(original.same_content(restored));
    }
}

#[tokio::test]
async fn load_missing_is_not_found() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    let err = gw.load("nope").await.unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound));
    assert_eq!(err.error_code(), "E_NOT_FOUND");
}

#[tokio::test]
async fn load_requires_identity() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, anonymous());
    assert!(matches!(gw.load("park").await, Err(PersistenceError::AuthRequired)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn load_malformed_document() {
    let store = Arc::new(TestStore::default());
    store.inner.save(USER, "broken", &json!({ "type": "FeatureCollection" })).await.expect("seed");
    let gw = gateway(&store, user());
    let err = gw.load("broken").await.unwrap_err();
    assert!(matches!(err, PersistenceError::MalformedDocument(DocumentError::MissingFeatures)));
    assert_eq!(err.error_code(), "E_MALFORMED_DOCUMENT");
}

#[tokio::test]
async fn load_reads_stringified_features() {
    let store = Arc::new(TestStore::default());
    let features = json!([
        { "type": "Feature", "geometry": { "type": "Point", "coordinates": [1.0, 2.0] }, "properties": { "name": "Cafe" } }
    ]);
    store
        .inner
        .save(USER, "legacy", &json!({ "type": "FeatureCollection", "features": features.to_string() }))
        .await
        .expect("seed");
    let gw = gateway(&store, user());
    let loaded = gw.load("legacy").await.expect("load");
    assert_eq!(loaded.report.shapes[0].props.name, "Cafe");
}

#[tokio::test]
async fn failed_load_leaves_session_untouched() {
    let store = Arc::new(TestStore::default());
    store.inner.save(USER, "broken", &json!("{not json")).await.expect("seed");
    let gw = gateway(&store, user());

    let mut core = EngineCore::default();
    core.set_tool(Tool::Marker);
    core.on_click(Coord::new(1.0, 1.0));
    core.set_tool(Tool::Line);
    core.on_click(Coord::new(2.0, 2.0));

    let ticket = core.begin_load("broken");
    assert!(gw.load(ticket.name()).await.is_err());
    assert_eq!(core.model.len(), 1);
    assert_eq!(core.draft.len(), 1);
}

#[tokio::test]
async fn load_finishing_after_close_is_discarded() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    gw.save("park", &sample_model()).await.expect("save");

    let mut core = EngineCore::default();
    let ticket = core.begin_load("park");
    let loaded = gw.load(ticket.name()).await.expect("load");
    core.close();
    assert!(core.finish_load(ticket, loaded.report.shapes).is_err());
    assert!(core.model.is_empty());
}

#[tokio::test]
async fn load_applies_through_engine() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    gw.save("park", &sample_model()).await.expect("save");

    let mut core = EngineCore::default();
    let ticket = core.begin_load("park");
    let loaded = gw.load(ticket.name()).await.expect("load");
    core.finish_load(ticket, loaded.report.shapes).expect("apply");
    assert_eq!(core.model.len(), 3);
}

// =============================================================================
// list / delete
// =============================================================================

#[tokio::test]
async fn list_returns_only_own_names() {
    let store = Arc::new(TestStore::default());
    store.inner.save("other@example.com", "theirs", &json!({ "features": [] })).await.expect("seed");
    let gw = gateway(&store, user());
    gw.save("mine", &sample_model()).await.expect("save");
    assert_eq!(gw.list().await.expect("list"), vec!["mine"]);
}

#[tokio::test]
async fn delete_cancelled_makes_no_store_call() {
    let store = Arc::new(TestStore::default());
    store.inner.save(USER, "park", &json!({ "features": [] })).await.expect("seed");
    let gw = gateway(&store, user());

    let outcome = gw.delete("park", &no()).await.expect("delete");
    assert_eq!(outcome, DeleteOutcome::Cancelled);
    assert_eq!(store.calls(), 0);
    assert_eq!(store.inner.len().await, 1);
}

#[tokio::test]
async fn delete_confirmed_removes_and_refreshes() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    gw.save("park", &sample_model()).await.expect("save");
    gw.save("lake", &sample_model()).await.expect("save");

    let outcome = gw.delete("park", &yes()).await.expect("delete");
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(gw.file_list().await, vec!["lake"]);
}

#[tokio::test]
async fn delete_passes_name_to_prompt() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    let asked = std::sync::Mutex::new(String::new());
    let confirm = |prompt: &str| {
        if let Ok(mut slot) = asked.lock() {
            prompt.clone_into(&mut slot);
        }
        false
    };
    gw.delete("park", &confirm).await.expect("delete");
    assert!(asked.lock().expect("lock").contains("park"));
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    assert!(matches!(gw.delete("nope", &yes()).await, Err(PersistenceError::NotFound)));
}

#[tokio::test]
async fn delete_all_is_scoped_to_caller() {
    let store = Arc::new(TestStore::default());
    store.inner.save("other@example.com", "theirs", &json!({ "features": [] })).await.expect("seed");
    let gw = gateway(&store, user());
    gw.save("one", &sample_model()).await.expect("save");
    gw.save("two", &sample_model()).await.expect("save");

    assert_eq!(gw.delete_all(&yes()).await.expect("delete"), DeleteOutcome::Deleted);
    assert!(gw.file_list().await.is_empty());
    assert_eq!(store.inner.list("other@example.com").await.expect("list"), vec!["theirs"]);
}

#[tokio::test]
async fn delete_all_cancelled() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());
    assert_eq!(gw.delete_all(&no()).await.expect("delete"), DeleteOutcome::Cancelled);
    assert_eq!(store.calls(), 0);
}

// =============================================================================
// admin
// =============================================================================

#[tokio::test]
async fn admin_operations_refuse_non_admin() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, user());

    assert!(matches!(gw.admin_list().await, Err(PersistenceError::Forbidden)));
    assert!(matches!(gw.admin_load(ADMIN, "x").await, Err(PersistenceError::Forbidden)));
    assert!(matches!(gw.admin_delete(ADMIN, "x", &yes()).await, Err(PersistenceError::Forbidden)));
    assert!(matches!(gw.admin_delete_all(&yes()).await, Err(PersistenceError::Forbidden)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn admin_operations_refuse_anonymous() {
    let store = Arc::new(TestStore::default());
    let gw = gateway(&store, anonymous());
    assert!(matches!(gw.admin_list().await, Err(PersistenceError::AuthRequired)));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn admin_lists_and_loads_any_owner() {
    let store = Arc::new(TestStore::default());
    let user_gw = gateway(&store, user());
    user_gw.save("park", &sample_model()).await.expect("save");

    let admin_gw = gateway(&store, admin());
    let entries = admin_gw.admin_list().await.expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].owner, USER);
    assert_eq!(entries[0].name, "park");

    let loaded = admin_gw.admin_load(USER, "park").await.expect("load");
    assert_eq!(loaded.owner, USER);
    assert_eq!(loaded.report.shapes.len(), 3);
}

#[tokio::test]
async fn admin_delete_other_owner() {
    let store = Arc::new(TestStore::default());
    gateway(&store, user()).save("park", &sample_model()).await.expect("save");
    let admin_gw = gateway(&store, admin());

    assert_eq!(admin_gw.admin_delete(USER, "park", &no()).await.expect("delete"), DeleteOutcome::Cancelled);
    assert_eq!(store.inner.len().await, 1);
    assert_eq!(admin_gw.admin_delete(USER, "park", &yes()).await.expect("delete"), DeleteOutcome::Deleted);
    assert!(store.inner.is_empty().await);
}

#[tokio::test]
async fn admin_delete_everything() {
    let store = Arc::new(TestStore::default());
    gateway(&store, user()).save("park", &sample_model()).await.expect("save");
    let admin_gw = gateway(&store, admin());
    admin_gw.save("mine", &sample_model()).await.expect("save");

    assert_eq!(admin_gw.admin_delete_all(&yes()).await.expect("delete"), DeleteOutcome::Deleted);
    assert!(store.inner.is_empty().await);
    assert!(admin_gw.file_list().await.is_empty());
}

// =============================================================================
// errors
// =============================================================================

#[test]
fn store_errors_map_to_gateway_errors() {
    assert!(matches!(PersistenceError::from(StoreError::NotFound), PersistenceError::NotFound));
    assert!(matches!(PersistenceError::from(StoreError::Unauthorized), PersistenceError::AuthRequired));
    assert!(matches!(PersistenceError::from(StoreError::Decode("x".into())), PersistenceError::Transport(_)));
}

#[test]
fn user_messages_are_plain() {
    assert_eq!(PersistenceError::Forbidden.user_message(), "Only administrators can do that.");
    assert_eq!(
        PersistenceError::Validation(ValidationError::EmptyName).user_message(),
        "Please enter a name."
    );
    assert!(!PersistenceError::NotFound.retryable());
}
