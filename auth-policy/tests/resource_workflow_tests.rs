//! End-to-end behaviour of the resource layer against stub policies:
//! listing, lookup, mutation and relation access for users and posts.

mod common;

use async_trait::async_trait;
use auth_policy::*;
use common::{posts, users, Fixture, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn assert_not_found(err: &AuthzError) {
    assert!(
        matches!(err, AuthzError::RecordNotFound { .. }),
        "expected not found, got {err:?}"
    );
}

fn assert_forbidden(err: &AuthzError, operation: Operation, resource_type: &str) {
    let failure = err
        .failure()
        .unwrap_or_else(|| panic!("expected forbidden, got {err:?}"));
    assert_eq!(failure.operation(), operation);
    assert_eq!(failure.resource_type().as_str(), resource_type);
}

// =============================================================================
// Index
// =============================================================================

#[tokio::test]
async fn test_index_uses_the_scope() {
    let fx = Fixture::new();
    let seeded = (0..3).map(|_| fx.store.seed(Row::user())).collect::<Vec<_>>();
    let chosen = seeded[1].clone();
    fx.users.set(|r| r.scope = ScopeFilter::only([chosen.id()]));

    let ctx = fx.ctx();
    let listed = fx.service.index(&ctx, &users()).await.unwrap();

    assert_eq!(listed, vec![chosen]);
    assert_eq!(fx.users.scope_calls(), 1);
    assert!(ctx.verify_authorized("GET /users", false).is_ok());
}

// =============================================================================
// Show
// =============================================================================

#[tokio::test]
async fn test_show_missing_user() {
    let fx = Fixture::new();
    let err = fx
        .service
        .show(&fx.ctx(), &users(), &fx.next_id(&users()))
        .await
        .unwrap_err();
    assert_not_found(&err);
}

#[tokio::test]
async fn test_show_uses_scope_not_a_predicate() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());

    fx.users.set(|r| r.scope = ScopeFilter::None);
    let err = fx.service.show(&fx.ctx(), &users(), &user.id()).await.unwrap_err();
    assert_not_found(&err);

    fx.users.set(|r| r.scope = ScopeFilter::All);
    let shown = fx.service.show(&fx.ctx(), &users(), &user.id()).await.unwrap();
    assert_eq!(shown, user);

    assert_eq!(fx.users.predicate_calls(), 0);
    assert_eq!(fx.users.scope_calls(), 2);
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn test_create_denied() {
    let fx = Fixture::new();
    let err = fx.service.create(&fx.ctx(), Row::user()).await.unwrap_err();

    assert_forbidden(&err, Operation::Create, "user");
    assert_eq!(err.failure().unwrap().action(), Action::Create);
    assert_eq!(fx.store.count(&users()), 0);
}

#[tokio::test]
async fn test_create_allowed() {
    let fx = Fixture::new();
    fx.users.set(|r| r.create = true);

    let created = fx.service.create(&fx.ctx(), Row::user()).await.unwrap();
    assert!(created.id.is_some());
    assert_eq!(fx.store.count(&users()), 1);
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_missing_user() {
    let fx = Fixture::new();
    fx.users.set(|r| r.update = true);
    let err = fx
        .service
        .update(&fx.ctx(), &users(), &fx.next_id(&users()), |_| {})
        .await
        .unwrap_err();
    assert_not_found(&err);
}

#[tokio::test]
async fn test_update_invisible_user_is_not_found_even_when_denied() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    fx.users.set(|r| {
        r.scope = ScopeFilter::None;
        r.update = false;
    });

    let err = fx
        .service
        .update(&fx.ctx(), &users(), &user.id(), |_| {})
        .await
        .unwrap_err();
    assert_not_found(&err);
    assert_eq!(fx.users.predicate_calls(), 0);
}

#[tokio::test]
async fn test_update_visible_but_denied_is_forbidden() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());

    let err = fx
        .service
        .update(&fx.ctx(), &users(), &user.id(), |row| row.title = "renamed".into())
        .await
        .unwrap_err();
    assert_forbidden(&err, Operation::Update, "user");

    let stored = fx.store.find(&users(), &user.id()).await.unwrap().unwrap();
    assert_eq!(stored.title, "");
}

#[tokio::test]
async fn test_update_allowed() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    fx.users.set(|r| r.update = true);

    let updated = fx
        .service
        .update(&fx.ctx(), &users(), &user.id(), |row| row.title = "renamed".into())
        .await
        .unwrap();
    assert_eq!(updated.id, user.id);
    assert_eq!(updated.title, "renamed");
}

// =============================================================================
// Destroy
// =============================================================================

#[tokio::test]
async fn test_destroy_invisible_user_is_not_found() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    fx.users.set(|r| r.scope = ScopeFilter::None);

    let err = fx
        .service
        .destroy(&fx.ctx(), &users(), &user.id())
        .await
        .unwrap_err();
    assert_not_found(&err);
    assert_eq!(fx.store.count(&users()), 1);
}

#[tokio::test]
async fn test_destroy_visible_but_denied_is_forbidden() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());

    let err = fx
        .service
        .destroy(&fx.ctx(), &users(), &user.id())
        .await
        .unwrap_err();
    assert_forbidden(&err, Operation::Destroy, "user");
    assert_eq!(fx.store.count(&users()), 1);
}

#[tokio::test]
async fn test_destroy_removes_exactly_one_record() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    fx.store.seed(Row::user());
    fx.users.set(|r| r.destroy = true);

    fx.service
        .destroy(&fx.ctx(), &users(), &user.id())
        .await
        .unwrap();
    assert_eq!(fx.store.count(&users()), 1);
    assert!(fx.store.find(&users(), &user.id()).await.unwrap().is_none());
}

// =============================================================================
// Related resources
// =============================================================================

#[tokio::test]
async fn test_related_user_of_post_without_user() {
    let fx = Fixture::new();
    let post = fx.store.seed(Row::post("Hello"));

    let ctx = fx.ctx();
    let related = fx
        .service
        .get_related(&ctx, &posts(), &post.id(), "user")
        .await
        .unwrap();
    assert!(related.is_absent());
    assert_eq!(fx.users.scope_calls(), 0);
}

#[tokio::test]
async fn test_related_user_visibility() {
    let fx = Fixture::new();
    let post = fx.store.seed(Row::post("Hello"));
    let user = fx.store.seed(Row::user());
    fx.store.link(&post, "user", &user);

    let visible = fx
        .service
        .get_related(&fx.ctx(), &posts(), &post.id(), "user")
        .await
        .unwrap();
    assert_eq!(visible.into_one(), Some(user.clone()));

    fx.users.set(|r| r.scope = ScopeFilter::None);
    let hidden = fx
        .service
        .get_related(&fx.ctx(), &posts(), &post.id(), "user")
        .await
        .unwrap();
    assert!(hidden.is_absent());
}

#[tokio::test]
async fn test_related_posts_of_missing_user() {
    let fx = Fixture::new();
    let err = fx
        .service
        .get_related(&fx.ctx(), &users(), &fx.next_id(&users()), "posts")
        .await
        .unwrap_err();
    assert_not_found(&err);
}

#[tokio::test]
async fn test_related_posts_are_scope_and_ownership_intersection() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    let all = (0..4)
        .map(|i| fx.store.seed(Row::post(&format!("post {i}"))))
        .collect::<Vec<_>>();
    fx.store.link(&user, "posts", &all[0]);
    fx.store.link(&user, "posts", &all[1]);

    // one post of the user and one that belongs to nobody
    fx.posts
        .set(|r| r.scope = ScopeFilter::only([all[1].id(), all[3].id()]));

    let related = fx
        .service
        .get_related(&fx.ctx(), &users(), &user.id(), "posts")
        .await
        .unwrap();
    assert_eq!(related.into_many(), vec![all[1].clone()]);
    assert_eq!(fx.posts.scope_calls(), 1);
}

#[tokio::test]
async fn test_aliased_relation_reads_its_accessor() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    let post = fx.store.seed(Row::post("Hello world"));
    fx.store.link(&user, "x_post", &post);

    let related = fx
        .service
        .get_related(&fx.ctx(), &users(), &user.id(), "post")
        .await
        .unwrap()
        .into_one()
        .unwrap();
    assert!(related.title.starts_with("Hello"));
}

#[tokio::test]
async fn test_ambiguous_relation_fails_on_first_access() {
    let fx = Fixture::new();
    fx.service
        .authorizer()
        .relations()
        .define("post", RelationDescriptor::to_many("user", "user"));
    let post = fx.store.seed(Row::post("Hello"));

    let err = fx
        .service
        .get_related(&fx.ctx(), &posts(), &post.id(), "user")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::AmbiguousRelation { matches: 2, .. }));
}

#[tokio::test]
async fn test_show_relationship_lists_visible_ids() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    let first = fx.store.seed(Row::post("first"));
    let second = fx.store.seed(Row::post("second"));
    fx.store.link(&user, "posts", &first);
    fx.store.link(&user, "posts", &second);
    fx.posts.set(|r| r.scope = ScopeFilter::only([first.id()]));

    let ids = fx
        .service
        .show_relationship(&fx.ctx(), &users(), &user.id(), "posts")
        .await
        .unwrap();
    assert_eq!(ids, vec![first.id()]);

    fx.posts.set(|r| r.scope = ScopeFilter::None);
    fx.store.link(&user, "x_post", &second);
    let ids = fx
        .service
        .show_relationship(&fx.ctx(), &users(), &user.id(), "post")
        .await
        .unwrap();
    assert!(ids.is_empty());
}

// =============================================================================
// Relationship updates
// =============================================================================

#[tokio::test]
async fn test_update_relationship_of_missing_post() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    let err = fx
        .service
        .update_to_one(&fx.ctx(), &posts(), &fx.next_id(&posts()), "user", Some(&user.id()))
        .await
        .unwrap_err();
    assert_not_found(&err);
}

#[tokio::test]
async fn test_update_relationship_denied() {
    let fx = Fixture::new();
    let post = fx.store.seed(Row::post("Hello"));
    let user = fx.store.seed(Row::user());

    let err = fx
        .service
        .update_to_one(&fx.ctx(), &posts(), &post.id(), "user", Some(&user.id()))
        .await
        .unwrap_err();
    assert_forbidden(&err, Operation::UpdateRelationship, "post");
    assert!(fx.store.linked_ids(&post, "user").is_empty());
}

#[tokio::test]
async fn test_update_relationship_allowed() {
    let fx = Fixture::new();
    let post = fx.store.seed(Row::post("Hello"));
    let user = fx.store.seed(Row::user());
    fx.posts.set(|r| r.update = true);

    fx.service
        .update_to_one(&fx.ctx(), &posts(), &post.id(), "user", Some(&user.id()))
        .await
        .unwrap();
    assert_eq!(fx.store.linked_ids(&post, "user"), vec![user.id()]);
}

#[tokio::test]
async fn test_create_relationship_with_missing_post() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    fx.posts.set(|r| r.update = true);

    let err = fx
        .service
        .add_to_many(&fx.ctx(), &users(), &user.id(), "posts", &[fx.next_id(&posts())])
        .await
        .unwrap_err();
    assert_not_found(&err);
}

#[tokio::test]
async fn test_create_relationship_denied() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    let post = fx.store.seed(Row::post("Hello"));

    let err = fx
        .service
        .add_to_many(&fx.ctx(), &users(), &user.id(), "posts", &[post.id()])
        .await
        .unwrap_err();
    assert_forbidden(&err, Operation::CreateRelationship, "post");
    assert!(fx.store.linked_ids(&user, "posts").is_empty());
}

#[tokio::test]
async fn test_create_relationship_allowed() {
    let fx = Fixture::new();
    let user = fx.store.seed(Row::user());
    let post = fx.store.seed(Row::post("Hello"));
    fx.posts.set(|r| r.update = true);

    fx.service
        .add_to_many(&fx.ctx(), &users(), &user.id(), "posts", &[post.id()])
        .await
        .unwrap();
    assert_eq!(fx.store.linked_ids(&user, "posts"), vec![post.id()]);

    fx.service
        .remove_from_many(&fx.ctx(), &users(), &user.id(), "posts", &[post.id()])
        .await
        .unwrap();
    assert!(fx.store.linked_ids(&user, "posts").is_empty());
}

// =============================================================================
// Hooks
// =============================================================================

struct Flag(Arc<AtomicBool>);

#[async_trait]
impl Hook for Flag {
    async fn call(&self, _event: &HookEvent) -> anyhow::Result<()> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Abort;

#[async_trait]
impl Hook for Abort {
    async fn call(&self, _event: &HookEvent) -> anyhow::Result<()> {
        anyhow::bail!("audit log unavailable")
    }
}

#[tokio::test]
async fn test_before_hook_runs_before_the_predicate() {
    let fx = Fixture::with_hooks(HookChain::new().before("audit", Abort));
    let user = fx.store.seed(Row::user());
    fx.users.set(|r| r.destroy = true);

    let err = fx
        .service
        .destroy(&fx.ctx(), &users(), &user.id())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Hook { ref hook, .. } if hook == "audit"));
    assert_eq!(fx.users.predicate_calls(), 0);
    assert_eq!(fx.store.count(&users()), 1);
}

#[tokio::test]
async fn test_after_hook_runs_once_authorized() {
    let called = Arc::new(AtomicBool::new(false));
    let fx = Fixture::with_hooks(HookChain::new().after("audit", Flag(called.clone())));
    let user = fx.store.seed(Row::user());
    fx.users.set(|r| r.destroy = true);

    fx.service
        .destroy(&fx.ctx(), &users(), &user.id())
        .await
        .unwrap();
    assert!(called.load(Ordering::SeqCst));
    assert_eq!(fx.users.predicate_calls(), 1);
}

#[tokio::test]
async fn test_after_hook_skipped_on_denial() {
    let called = Arc::new(AtomicBool::new(false));
    let fx = Fixture::with_hooks(HookChain::new().after("audit", Flag(called.clone())));
    let user = fx.store.seed(Row::user());

    assert!(fx
        .service
        .destroy(&fx.ctx(), &users(), &user.id())
        .await
        .is_err());
    assert!(!called.load(Ordering::SeqCst));
}
