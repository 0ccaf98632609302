//! Resource operations with authorization wired in.
//!
//! [`ResourceService`] sits between request handlers and a [`RecordStore`].
//! Every operation it offers resolves policies, checks visibility before
//! mutation permission and masks relations, so a handler built on it cannot
//! forget to authorize.

use crate::{
    authorizer::Authorizer,
    enforcement::AuthzContext,
    error::{AuthzError, Result},
    models::{
        Operation, Record, RecordId, RelatedValue, RelationDescriptor, RelationKind, ResourceType,
    },
    scope::ScopeFilter,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Persistence collaborator the resource layer reads and writes through
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    async fn find(&self, resource_type: &ResourceType, id: &RecordId) -> Result<Option<R>>;

    /// Records of a type, restricted to `scope`
    async fn list(&self, resource_type: &ResourceType, scope: &ScopeFilter) -> Result<Vec<R>>;

    /// Load the raw related value(s). `hint` may be used to narrow the
    /// query; results are masked again afterwards either way.
    async fn fetch_related(
        &self,
        record: &R,
        descriptor: &RelationDescriptor,
        hint: Option<&ScopeFilter>,
    ) -> Result<RelatedValue<R>>;

    async fn save(&self, record: R) -> Result<R>;

    /// Returns whether a record was removed
    async fn delete(&self, record: &R) -> Result<bool>;

    async fn set_to_one(
        &self,
        record: &R,
        descriptor: &RelationDescriptor,
        related: Option<&R>,
    ) -> Result<()>;

    async fn add_to_many(&self, record: &R, descriptor: &RelationDescriptor, related: &[R])
        -> Result<()>;

    async fn remove_from_many(
        &self,
        record: &R,
        descriptor: &RelationDescriptor,
        related: &[R],
    ) -> Result<()>;
}

/// Authorized access to the records of a [`RecordStore`]
pub struct ResourceService<R: Record> {
    authorizer: Arc<Authorizer<R>>,
    store: Arc<dyn RecordStore<R>>,
}

impl<R: Record> Clone for ResourceService<R> {
    fn clone(&self) -> Self {
        Self {
            authorizer: Arc::clone(&self.authorizer),
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: Record> ResourceService<R> {
    pub fn new(authorizer: Arc<Authorizer<R>>, store: Arc<dyn RecordStore<R>>) -> Self {
        Self { authorizer, store }
    }

    pub fn authorizer(&self) -> &Authorizer<R> {
        &self.authorizer
    }

    // =============================================================================
    // Records
    // =============================================================================

    /// Records the subject may see; the scope is pushed into the store query
    pub async fn index(&self, ctx: &AuthzContext, resource_type: &ResourceType) -> Result<Vec<R>> {
        debug!(operation = %Operation::Index, resource_type = %resource_type, "Serving resource operation");
        let scope = self.authorizer.scope_for(ctx, resource_type)?;
        let records = self.store.list(resource_type, scope.resolve().await?).await?;
        scope
            .filter_collection(records)
            .await
            .map_err(|e| e.during(Operation::Index))
    }

    pub async fn show(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
    ) -> Result<R> {
        debug!(operation = %Operation::Show, resource_type = %resource_type, record_id = %id, "Serving resource operation");
        self.find_visible(ctx, resource_type, id)
            .await
            .map_err(|e| e.during(Operation::Show))
    }

    pub async fn create(&self, ctx: &AuthzContext, record: R) -> Result<R> {
        self.authorizer
            .authorize_write(ctx, &record)
            .await
            .map_err(|e| e.during(Operation::Create))?;
        let saved = self.store.save(record).await?;
        info!(resource_type = %saved.resource_type(), "Created record");
        Ok(saved)
    }

    pub async fn update<F>(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
        changes: F,
    ) -> Result<R>
    where
        F: FnOnce(&mut R) + Send,
    {
        let mut record = self.find_visible(ctx, resource_type, id).await?;
        changes(&mut record);
        self.authorizer
            .authorize_write(ctx, &record)
            .await
            .map_err(|e| e.during(Operation::Update))?;
        self.store.save(record).await
    }

    pub async fn destroy(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
    ) -> Result<()> {
        let record = self.find_visible(ctx, resource_type, id).await?;
        self.authorizer
            .authorize_destroy(ctx, &record)
            .await
            .map_err(|e| e.during(Operation::Destroy))?;
        if !self.store.delete(&record).await? {
            return Err(AuthzError::not_found(resource_type.clone(), id.clone()));
        }
        info!(resource_type = %resource_type, record_id = %id, "Destroyed record");
        Ok(())
    }

    // =============================================================================
    // Relations
    // =============================================================================

    /// Related record(s) of a visible parent, masked to the subject's scope
    pub async fn get_related(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
        relation: &str,
    ) -> Result<RelatedValue<R>> {
        let parent = self.find_visible(ctx, resource_type, id).await?;
        let descriptor = self.authorizer.relations().resolve(resource_type, relation)?;
        let operation = match descriptor.kind {
            RelationKind::ToOne => Operation::GetRelatedResource,
            RelationKind::ToMany => Operation::GetRelatedResources,
        };
        debug!(operation = %operation, resource_type = %resource_type, record_id = %id, relation, "Serving resource operation");

        self.fetch_visible_related(ctx, &parent, &descriptor)
            .await
            .map_err(|e| e.during(operation))
    }

    /// Identities of the related record(s) the subject may see
    pub async fn show_relationship(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
        relation: &str,
    ) -> Result<Vec<RecordId>> {
        debug!(operation = %Operation::ShowRelationship, resource_type = %resource_type, record_id = %id, relation, "Serving resource operation");
        let parent = self.find_visible(ctx, resource_type, id).await?;
        let descriptor = self.authorizer.relations().resolve(resource_type, relation)?;
        let related = self
            .fetch_visible_related(ctx, &parent, &descriptor)
            .await
            .map_err(|e| e.during(Operation::ShowRelationship))?;
        Ok(related
            .into_many()
            .iter()
            .filter_map(Record::record_id)
            .collect())
    }

    async fn fetch_visible_related(
        &self,
        ctx: &AuthzContext,
        parent: &R,
        descriptor: &RelationDescriptor,
    ) -> Result<RelatedValue<R>> {
        match descriptor.kind {
            RelationKind::ToMany => {
                let scope = self.authorizer.scope_for(ctx, &descriptor.related_type)?;
                let hint = scope.resolve().await?;
                let raw = self
                    .store
                    .fetch_related(parent, descriptor, Some(hint))
                    .await?;
                Authorizer::mask_related(&scope, descriptor, raw).await
            }
            RelationKind::ToOne => {
                let raw = self.store.fetch_related(parent, descriptor, None).await?;
                self.authorizer
                    .authorize_relation_fetch(ctx, descriptor, raw)
                    .await
            }
        }
    }

    /// Point a to-one relation at another record, or clear it.
    ///
    /// The parent's foreign key changes, so the parent must be updatable.
    pub async fn update_to_one(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
        relation: &str,
        related_id: Option<&RecordId>,
    ) -> Result<()> {
        let parent = self.find_visible(ctx, resource_type, id).await?;
        let descriptor = self.descriptor_of(resource_type, relation, RelationKind::ToOne)?;
        let related = match related_id {
            Some(related_id) => Some(
                self.find_visible(ctx, &descriptor.related_type, related_id)
                    .await?,
            ),
            None => None,
        };

        self.authorizer
            .authorize_write(ctx, &parent)
            .await
            .map_err(|e| e.during(Operation::UpdateRelationship))?;
        self.store
            .set_to_one(&parent, &descriptor, related.as_ref())
            .await
    }

    /// Attach records to a to-many relation.
    ///
    /// The attached records are the ones whose foreign keys change, so each
    /// of them must be updatable.
    pub async fn add_to_many(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
        relation: &str,
        related_ids: &[RecordId],
    ) -> Result<()> {
        let (parent, descriptor, related) = self
            .load_to_many(ctx, resource_type, id, relation, related_ids, Operation::CreateRelationship)
            .await?;
        self.store.add_to_many(&parent, &descriptor, &related).await
    }

    pub async fn remove_from_many(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
        relation: &str,
        related_ids: &[RecordId],
    ) -> Result<()> {
        let (parent, descriptor, related) = self
            .load_to_many(ctx, resource_type, id, relation, related_ids, Operation::DeleteRelationship)
            .await?;
        self.store
            .remove_from_many(&parent, &descriptor, &related)
            .await
    }

    async fn load_to_many(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
        relation: &str,
        related_ids: &[RecordId],
        operation: Operation,
    ) -> Result<(R, RelationDescriptor, Vec<R>)> {
        let parent = self.find_visible(ctx, resource_type, id).await?;
        let descriptor = self.descriptor_of(resource_type, relation, RelationKind::ToMany)?;

        let mut related = Vec::with_capacity(related_ids.len());
        for related_id in related_ids {
            let record = self
                .find_visible(ctx, &descriptor.related_type, related_id)
                .await?;
            self.authorizer
                .authorize_write(ctx, &record)
                .await
                .map_err(|e| e.during(operation))?;
            related.push(record);
        }
        Ok((parent, descriptor, related))
    }

    // =============================================================================
    // Helpers
    // =============================================================================

    /// Missing and invisible records are indistinguishable to the caller
    async fn find_visible(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
    ) -> Result<R> {
        let scope = self.authorizer.scope_for(ctx, resource_type)?;
        let record = self.store.find(resource_type, id).await?;
        match record {
            Some(record) if scope.admits(&record).await? => Ok(record),
            _ => {
                debug!(resource_type = %resource_type, record_id = %id, "Record not found or not visible");
                Err(AuthzError::not_found(resource_type.clone(), id.clone()))
            }
        }
    }

    fn descriptor_of(
        &self,
        resource_type: &ResourceType,
        relation: &str,
        kind: RelationKind,
    ) -> Result<RelationDescriptor> {
        let descriptor = self.authorizer.relations().resolve(resource_type, relation)?;
        if descriptor.kind != kind {
            return Err(AuthzError::Configuration(format!(
                "relation {} on {} is not {:?}",
                relation, resource_type, kind
            )));
        }
        Ok(descriptor)
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Records that can be given an id by [`InMemoryRecordStore`]
pub trait Assignable: Record {
    fn assign_id(&mut self, id: RecordId);
}

type RecordKey = (ResourceType, RecordId);
type LinkKey = (ResourceType, RecordId, String);

/// In-memory record store for testing and development
pub struct InMemoryRecordStore<R: Assignable> {
    records: DashMap<RecordKey, R>,
    links: DashMap<LinkKey, Vec<RecordId>>,
    next_id: AtomicI64,
}

impl<R: Assignable> InMemoryRecordStore<R> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            links: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Insert a record directly, bypassing authorization
    pub fn seed(&self, mut record: R) -> R {
        if record.is_new_record() {
            record.assign_id(RecordId::from(self.next_id.fetch_add(1, Ordering::SeqCst)));
        }
        if let Some(id) = record.record_id() {
            self.records
                .insert((record.resource_type(), id), record.clone());
        }
        record
    }

    /// Link two records directly, bypassing authorization
    pub fn link(&self, parent: &R, accessor: &str, related: &R) {
        if let (Some(parent_id), Some(related_id)) = (parent.record_id(), related.record_id()) {
            let mut ids = self
                .links
                .entry((parent.resource_type(), parent_id, accessor.to_string()))
                .or_default();
            if !ids.contains(&related_id) {
                ids.push(related_id);
            }
        }
    }

    pub fn count(&self, resource_type: &ResourceType) -> usize {
        self.records
            .iter()
            .filter(|entry| &entry.key().0 == resource_type)
            .count()
    }

    pub fn linked_ids(&self, parent: &R, accessor: &str) -> Vec<RecordId> {
        parent
            .record_id()
            .and_then(|id| {
                self.links
                    .get(&(parent.resource_type(), id, accessor.to_string()))
                    .map(|entry| entry.value().clone())
            })
            .unwrap_or_default()
    }

    fn link_key(record: &R, descriptor: &RelationDescriptor) -> Result<LinkKey> {
        let id = record.record_id().ok_or_else(|| {
            AuthzError::DataLayer(anyhow::anyhow!("record has not been persisted"))
        })?;
        Ok((record.resource_type(), id, descriptor.accessor.clone()))
    }

    fn sorted(mut records: Vec<R>) -> Vec<R> {
        records.sort_by_key(|record| {
            record
                .record_id()
                .map(|id| (id.as_str().len(), id.as_str().to_string()))
        });
        records
    }
}

impl<R: Assignable> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Assignable> RecordStore<R> for InMemoryRecordStore<R> {
    async fn find(&self, resource_type: &ResourceType, id: &RecordId) -> Result<Option<R>> {
        Ok(self
            .records
            .get(&(resource_type.clone(), id.clone()))
            .map(|entry| entry.value().clone()))
    }

    async fn list(&self, resource_type: &ResourceType, scope: &ScopeFilter) -> Result<Vec<R>> {
        let records = self
            .records
            .iter()
            .filter(|entry| &entry.key().0 == resource_type && scope.contains(&entry.key().1))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::sorted(records))
    }

    async fn fetch_related(
        &self,
        record: &R,
        descriptor: &RelationDescriptor,
        hint: Option<&ScopeFilter>,
    ) -> Result<RelatedValue<R>> {
        let ids = self
            .links
            .get(&Self::link_key(record, descriptor)?)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let related = ids
            .iter()
            .filter(|id| hint.map_or(true, |scope| scope.contains(id)))
            .filter_map(|id| {
                self.records
                    .get(&(descriptor.related_type.clone(), id.clone()))
                    .map(|entry| entry.value().clone())
            })
            .collect::<Vec<_>>();

        Ok(match descriptor.kind {
            RelationKind::ToOne => RelatedValue::One(related.into_iter().next()),
            RelationKind::ToMany => RelatedValue::Many(Self::sorted(related)),
        })
    }

    async fn save(&self, record: R) -> Result<R> {
        Ok(self.seed(record))
    }

    async fn delete(&self, record: &R) -> Result<bool> {
        let Some(id) = record.record_id() else {
            return Ok(false);
        };
        let key = (record.resource_type(), id);
        let removed = self.records.remove(&key).is_some();
        self.links
            .retain(|link, _| !(link.0 == key.0 && link.1 == key.1));
        Ok(removed)
    }

    async fn set_to_one(
        &self,
        record: &R,
        descriptor: &RelationDescriptor,
        related: Option<&R>,
    ) -> Result<()> {
        let key = Self::link_key(record, descriptor)?;
        match related.and_then(|r| r.record_id()) {
            Some(related_id) => {
                self.links.insert(key, vec![related_id]);
            }
            None => {
                self.links.remove(&key);
            }
        }
        Ok(())
    }

    async fn add_to_many(
        &self,
        record: &R,
        descriptor: &RelationDescriptor,
        related: &[R],
    ) -> Result<()> {
        let key = Self::link_key(record, descriptor)?;
        let mut ids = self.links.entry(key).or_default();
        for related_id in related.iter().filter_map(|r| r.record_id()) {
            if !ids.contains(&related_id) {
                ids.push(related_id);
            }
        }
        Ok(())
    }

    async fn remove_from_many(
        &self,
        record: &R,
        descriptor: &RelationDescriptor,
        related: &[R],
    ) -> Result<()> {
        let key = Self::link_key(record, descriptor)?;
        if let Some(mut ids) = self.links.get_mut(&key) {
            let removed = related
                .iter()
                .filter_map(|r| r.record_id())
                .collect::<Vec<_>>();
            ids.retain(|id| !removed.contains(id));
        }
        Ok(())
    }
}
