//! Users and posts, with policies whose answers each test can flip.

#![allow(dead_code)]

use async_trait::async_trait;
use auth_policy::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub kind: &'static str,
    pub id: Option<RecordId>,
    pub title: String,
}

impl Row {
    pub fn user() -> Self {
        Self {
            kind: "user",
            id: None,
            title: String::new(),
        }
    }

    pub fn post(title: &str) -> Self {
        Self {
            kind: "post",
            id: None,
            title: title.to_string(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id.clone().expect("row was not persisted")
    }
}

impl Record for Row {
    fn resource_type(&self) -> ResourceType {
        ResourceType::new(self.kind)
    }

    fn record_id(&self) -> Option<RecordId> {
        self.id.clone()
    }
}

impl Assignable for Row {
    fn assign_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }
}

/// Answers a stub policy gives
#[derive(Clone, Debug)]
pub struct Rules {
    pub scope: ScopeFilter,
    pub create: bool,
    pub update: bool,
    pub destroy: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            scope: ScopeFilter::All,
            create: false,
            update: false,
            destroy: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct Stub {
    rules: Arc<RwLock<Rules>>,
    scope_calls: Arc<AtomicUsize>,
    predicate_calls: Arc<AtomicUsize>,
}

impl Stub {
    pub fn set(&self, change: impl FnOnce(&mut Rules)) {
        change(&mut self.rules.write().unwrap());
    }

    pub fn scope_calls(&self) -> usize {
        self.scope_calls.load(Ordering::SeqCst)
    }

    pub fn predicate_calls(&self) -> usize {
        self.predicate_calls.load(Ordering::SeqCst)
    }

    fn answer(&self, pick: impl FnOnce(&Rules) -> bool) -> Result<bool> {
        self.predicate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(pick(&self.rules.read().unwrap()))
    }
}

pub struct StubPolicy(Stub);

#[async_trait]
impl Policy<Row> for StubPolicy {
    async fn create(&self) -> Result<bool> {
        self.0.answer(|r| r.create)
    }

    async fn update(&self) -> Result<bool> {
        self.0.answer(|r| r.update)
    }

    async fn destroy(&self) -> Result<bool> {
        self.0.answer(|r| r.destroy)
    }

    async fn scope(&self) -> Result<ScopeFilter> {
        self.0.scope_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.rules.read().unwrap().scope.clone())
    }
}

pub fn users() -> ResourceType {
    ResourceType::new("user")
}

pub fn posts() -> ResourceType {
    ResourceType::new("post")
}

pub struct Fixture {
    pub store: Arc<InMemoryRecordStore<Row>>,
    pub service: ResourceService<Row>,
    pub users: Stub,
    pub posts: Stub,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_hooks(HookChain::new())
    }

    pub fn with_hooks(hooks: HookChain) -> Self {
        let users = Stub::default();
        let posts = Stub::default();

        let policies = PolicyRegistry::new();
        let stub = users.clone();
        policies
            .register("user", move |_, _| {
                Arc::new(StubPolicy(stub.clone())) as Arc<dyn Policy<Row>>
            })
            .unwrap();
        let stub = posts.clone();
        policies
            .register("post", move |_, _| {
                Arc::new(StubPolicy(stub.clone())) as Arc<dyn Policy<Row>>
            })
            .unwrap();

        let relations = RelationRegistry::new();
        relations.define("user", RelationDescriptor::to_one("x_post", "post"));
        relations.define(
            "user",
            RelationDescriptor::to_one("post", "post").with_accessor("x_post"),
        );
        relations.define("user", RelationDescriptor::to_many("posts", "post"));
        relations.define("post", RelationDescriptor::to_one("user", "user"));

        let authorizer = Authorizer::new(Arc::new(policies), Arc::new(relations)).with_hooks(hooks);
        let store = Arc::new(InMemoryRecordStore::new());
        let service = ResourceService::new(
            Arc::new(authorizer),
            Arc::clone(&store) as Arc<dyn RecordStore<Row>>,
        );

        Self {
            store,
            service,
            users,
            posts,
        }
    }

    pub fn ctx(&self) -> AuthzContext {
        AuthzContext::for_subject(Subject::user("alice"))
    }

    /// An id no record of `resource_type` has
    pub fn next_id(&self, resource_type: &ResourceType) -> RecordId {
        RecordId::from(self.store.count(resource_type) as i64 + 1000)
    }
}
