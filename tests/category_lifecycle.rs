//! Integration tests for the category lifecycle: create, move, hide/show, delete.
//!
//! Each test creates its own in-memory SQLite database for isolation and
//! drives the public `CategoryStore` API end to end.

use pretty_assertions::assert_eq;
use std::sync::Arc;

use coursecat::category::{
    Access, AllowAll, Capability, Category, CategoryError, CategoryStore, CategoryUpdate, Grants,
    NewCategory, Scope, Strictness, TreeCache,
};
use coursecat::storage::{Database, NewCourse, DEFAULT_CATEGORY_SETTING};

async fn test_store() -> CategoryStore {
    let db = Database::open(":memory:").await.unwrap();
    CategoryStore::new(db, Arc::new(TreeCache::default()), Arc::new(AllowAll))
}

async fn create(store: &CategoryStore, name: &str, parent: i64) -> Category {
    store.create(NewCategory::named(name, parent)).await.unwrap()
}

async fn add_course(store: &CategoryStore, category: i64, shortname: &str) -> i64 {
    store
        .database()
        .insert_course(&NewCourse {
            category,
            fullname: format!("{shortname} course"),
            shortname: shortname.to_string(),
            visible: true,
            ..NewCourse::default()
        })
        .await
        .unwrap()
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_computes_path_and_depth() {
    let store = test_store().await;

    let science = create(&store, "Science", 0).await;
    assert_eq!(science.depth, 1);
    assert_eq!(science.path, format!("/{}", science.id));
    assert_eq!(science.parent, 0);

    let physics = create(&store, "Physics", science.id).await;
    assert_eq!(physics.depth, 2);
    assert_eq!(physics.path, format!("/{}/{}", science.id, physics.id));
    assert_eq!(store.children_ids(science.id).await.unwrap(), vec![physics.id]);
}

#[tokio::test]
async fn test_create_validates_name() {
    let store = test_store().await;

    let err = store.create(NewCategory::named("   ", 0)).await.unwrap_err();
    assert!(matches!(err, CategoryError::Validation { field: "name", .. }));
    assert!(err.is_user_error());

    let err = store
        .create(NewCategory::named("x".repeat(256), 0))
        .await
        .unwrap_err();
    assert!(matches!(err, CategoryError::Validation { field: "name", .. }));
}

#[tokio::test]
async fn test_create_under_missing_parent_fails() {
    let store = test_store().await;
    let err = store.create(NewCategory::named("Orphan", 42)).await.unwrap_err();
    assert!(matches!(err, CategoryError::NotFound(42)));
}

#[tokio::test]
async fn test_idnumber_uniqueness_is_case_sensitive() {
    let store = test_store().await;
    let mut data = NewCategory::named("Science", 0);
    data.idnumber = Some("SCI".to_string());
    store.create(data).await.unwrap();

    let mut other = NewCategory::named("Other", 0);
    other.idnumber = Some("sci".to_string());
    assert!(store.create(other).await.is_ok());

    let mut long = NewCategory::named("Long", 0);
    long.idnumber = Some("x".repeat(101));
    let err = store.create(long).await.unwrap_err();
    assert!(matches!(err, CategoryError::Validation { field: "idnumber", .. }));
}

// ============================================================================
// Root and Lookup
// ============================================================================

#[tokio::test]
async fn test_root_pseudo_category_ignores_permissions() {
    let store = test_store().await;
    let nobody = store.for_viewer(Arc::new(Grants::new(None)));

    let root = nobody
        .get(0, Strictness::MustExist, Access::Checked)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(root.id, 0);
    assert_eq!(root.depth, 0);
    assert_eq!(root.path, "");
    assert!(root.visible);
}

#[tokio::test]
async fn test_hidden_category_is_not_found_for_viewer() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    store.hide(science.id).await.unwrap();

    let student = store.for_viewer(Arc::new(Grants::new(Some(5))));
    let err = student.require(science.id).await.unwrap_err();
    assert!(matches!(err, CategoryError::NotFound(_)));
    assert!(student
        .get(science.id, Strictness::IgnoreMissing, Access::Checked)
        .await
        .unwrap()
        .is_none());
    assert!(student.require_unchecked(science.id).await.is_ok());

    let manager = store.for_viewer(Arc::new(
        Grants::new(Some(6)).grant(Capability::ViewHiddenCategories, Scope::System),
    ));
    assert!(manager.require(science.id).await.is_ok());
}

#[tokio::test]
async fn test_grant_on_ancestor_applies_to_descendants() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;
    store.hide(science.id).await.unwrap();

    let dean = store.for_viewer(Arc::new(
        Grants::new(Some(9)).grant(Capability::ViewHiddenCategories, Scope::Category(science.id)),
    ));
    assert!(dean.require(physics.id).await.is_ok());
}

#[tokio::test]
async fn test_cache_rebuild_is_idempotent() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    create(&store, "Physics", science.id).await;
    create(&store, "Arts", 0).await;

    store.purge_cache();
    let first = store.get_all_ids().await.unwrap();
    let second = store.get_all_ids().await.unwrap();
    assert_eq!(*first, *second);

    store.purge_cache();
    let third = store.get_all_ids().await.unwrap();
    assert_eq!(*first, *third);
}

#[tokio::test]
async fn test_writes_are_visible_to_other_store_clones() {
    let store = test_store().await;
    let reader = store.clone();
    let science = create(&store, "Science", 0).await;
    assert_eq!(reader.children_ids(0).await.unwrap(), vec![science.id]);

    let arts = create(&store, "Arts", 0).await;
    assert_eq!(reader.children_ids(0).await.unwrap(), vec![science.id, arts.id]);
}

#[tokio::test]
async fn test_empty_tree_bootstraps_default_category() {
    let store = test_store().await.with_default_category_name("General");

    let top = store.children_ids(0).await.unwrap();
    assert_eq!(top.len(), 1);
    let general = store.require(top[0]).await.unwrap();
    assert_eq!(general.name, "General");
    assert_eq!(
        store
            .database()
            .get_setting(DEFAULT_CATEGORY_SETTING)
            .await
            .unwrap(),
        Some(general.id.to_string())
    );
}

#[tokio::test]
async fn test_nested_name_and_categories_list() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;
    let arts = create(&store, "Arts", 0).await;
    let secret = create(&store, "Secret", arts.id).await;
    store.hide(secret.id).await.unwrap();

    assert_eq!(
        store.nested_name(&physics, " / ").await.unwrap(),
        "Science / Physics"
    );
    assert_eq!(store.get_parents(&physics), vec![science.id]);

    let student = store.for_viewer(Arc::new(Grants::new(Some(1))));
    assert_eq!(
        student.make_categories_list(" / ").await.unwrap(),
        vec![
            (science.id, "Science".to_string()),
            (physics.id, "Science / Physics".to_string()),
            (arts.id, "Arts".to_string()),
        ]
    );
}

// ============================================================================
// Move
// ============================================================================

#[tokio::test]
async fn test_move_rewrites_subtree_paths() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;
    let quantum = create(&store, "Quantum", physics.id).await;
    let arts = create(&store, "Arts", 0).await;

    assert!(store.change_parent(physics.id, arts.id).await.unwrap());

    let physics = store.require(physics.id).await.unwrap();
    let quantum = store.require(quantum.id).await.unwrap();
    assert_eq!(physics.path, format!("/{}/{}", arts.id, physics.id));
    assert_eq!(quantum.path, format!("/{}/{}/{}", arts.id, physics.id, quantum.id));
    assert_eq!(quantum.depth, 3);
    assert!(store.children_ids(science.id).await.unwrap().is_empty());

    // Back to the top level.
    store.change_parent(physics.id, 0).await.unwrap();
    let quantum = store.require(quantum.id).await.unwrap();
    assert_eq!(quantum.path, format!("/{}/{}", physics.id, quantum.id));
    assert_eq!(quantum.depth, 2);
}

#[tokio::test]
async fn test_move_under_own_descendant_is_cycle() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;
    let before = store.get_all_ids().await.unwrap();

    let err = store.change_parent(science.id, physics.id).await.unwrap_err();
    assert!(matches!(
        err,
        CategoryError::Cycle { id, new_parent } if id == science.id && new_parent == physics.id
    ));
    let err = store.change_parent(science.id, science.id).await.unwrap_err();
    assert!(matches!(err, CategoryError::Cycle { .. }));

    assert_eq!(*store.get_all_ids().await.unwrap(), *before);
    assert_eq!(store.require(science.id).await.unwrap().parent, 0);
}

#[tokio::test]
async fn test_move_into_hidden_parent_hides_and_remembers() {
    let store = test_store().await;
    let archive = create(&store, "Archive", 0).await;
    store.hide(archive.id).await.unwrap();
    let science = create(&store, "Science", 0).await;

    store.change_parent(science.id, archive.id).await.unwrap();
    let moved = store.require(science.id).await.unwrap();
    assert!(!moved.visible);
    assert!(moved.visible_old);

    store.show(archive.id).await.unwrap();
    assert!(store.require(science.id).await.unwrap().visible);
}

// ============================================================================
// Visibility
// ============================================================================

#[tokio::test]
async fn test_hide_show_round_trip() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;

    assert!(store.hide(science.id).await.unwrap());
    let hidden_science = store.require(science.id).await.unwrap();
    let hidden_physics = store.require(physics.id).await.unwrap();
    assert!(!hidden_science.visible);
    assert!(!hidden_physics.visible);
    assert!(hidden_physics.visible_old);

    assert!(!store.hide(science.id).await.unwrap());

    assert!(store.show(science.id).await.unwrap());
    assert!(store.require(science.id).await.unwrap().visible);
    assert!(store.require(physics.id).await.unwrap().visible);
    assert!(!store.show(science.id).await.unwrap());
}

#[tokio::test]
async fn test_show_leaves_independently_hidden_child_hidden() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;
    let chemistry = create(&store, "Chemistry", science.id).await;

    store.hide(chemistry.id).await.unwrap();
    store.hide(science.id).await.unwrap();
    store.show(science.id).await.unwrap();

    assert!(store.require(physics.id).await.unwrap().visible);
    assert!(!store.require(chemistry.id).await.unwrap().visible);
}

#[tokio::test]
async fn test_update_visibility_before_parent() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let arts = create(&store, "Arts", 0).await;

    let updated = store
        .update(
            science.id,
            CategoryUpdate {
                visible: Some(false),
                parent: Some(arts.id),
                ..CategoryUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.visible);
    assert_eq!(updated.parent, arts.id);
    assert_eq!(updated.depth, 2);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_move_transfers_content() {
    let store = test_store().await;
    let x = create(&store, "X", 0).await;
    let y = create(&store, "Y", 0).await;
    let sub = create(&store, "Sub", x.id).await;
    let c1 = add_course(&store, x.id, "C1").await;
    let c2 = add_course(&store, x.id, "C2").await;

    assert!(store.can_move_content_to(x.id, y.id).await.unwrap());
    store.delete_move(x.id, y.id).await.unwrap();

    assert!(matches!(
        store.require(x.id).await.unwrap_err(),
        CategoryError::NotFound(_)
    ));
    assert_eq!(store.children_ids(y.id).await.unwrap(), vec![sub.id]);
    assert_eq!(
        store.require(sub.id).await.unwrap().path,
        format!("/{}/{}", y.id, sub.id)
    );
    assert_eq!(
        store.database().course_ids_in_category(y.id).await.unwrap(),
        vec![c1, c2]
    );
}

#[tokio::test]
async fn test_delete_full_removes_subtree_and_courses() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;
    let arts = create(&store, "Arts", 0).await;
    let c1 = add_course(&store, physics.id, "PHY").await;
    let c2 = add_course(&store, science.id, "SCI").await;

    let deleted = store.delete_full(science.id).await.unwrap();
    assert_eq!(deleted.categories, vec![physics.id, science.id]);
    assert_eq!(deleted.courses, vec![c1, c2]);

    assert_eq!(store.children_ids(0).await.unwrap(), vec![arts.id]);
    assert_eq!(store.require(arts.id).await.unwrap().sort_order, 1);
    assert_eq!(store.database().count_courses_in_category(physics.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_move_repoints_default_category() {
    let store = test_store().await;
    let x = create(&store, "X", 0).await;
    let y = create(&store, "Y", 0).await;
    store
        .database()
        .set_setting(DEFAULT_CATEGORY_SETTING, &x.id.to_string())
        .await
        .unwrap();

    store.delete_move(x.id, y.id).await.unwrap();
    assert_eq!(store.database().default_category_id().await.unwrap(), Some(y.id));
}

#[tokio::test]
async fn test_delete_permission_predicates() {
    let store = test_store().await;
    let science = create(&store, "Science", 0).await;
    let physics = create(&store, "Physics", science.id).await;
    let arts = create(&store, "Arts", 0).await;
    add_course(&store, science.id, "SCI").await;

    // Manages Science only, so cannot receive content in Arts.
    let local = store.for_viewer(Arc::new(
        Grants::new(Some(3))
            .grant(Capability::ManageCategories, Scope::Category(science.id))
            .grant(Capability::DeleteCourse, Scope::Category(science.id)),
    ));
    assert!(local.can_delete_full(science.id).await.unwrap());
    assert!(!local.can_move_content_to(science.id, arts.id).await.unwrap());
    assert!(!local.can_move_content_to(science.id, physics.id).await.unwrap());

    let nobody = store.for_viewer(Arc::new(Grants::new(Some(4))));
    assert!(!nobody.can_delete_full(science.id).await.unwrap());
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_sibling_sortorder_stays_dense() {
    let store = test_store().await;
    let a = create(&store, "A", 0).await;
    let b = create(&store, "B", 0).await;
    let c = create(&store, "C", 0).await;

    store.change_parent(b.id, a.id).await.unwrap();
    let top: Vec<i64> = store
        .get_many(&store.children_ids(0).await.unwrap(), Access::Unchecked)
        .await
        .unwrap()
        .iter()
        .map(|cat| cat.sort_order)
        .collect();
    assert_eq!(top, vec![1, 2]);

    assert!(store.change_sortorder_by_one(c.id, true).await.unwrap());
    assert_eq!(store.children_ids(0).await.unwrap(), vec![c.id, a.id]);
}
