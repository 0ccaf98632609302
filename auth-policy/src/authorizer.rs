use crate::{
    enforcement::AuthzContext,
    error::{AuthorizationFailure, AuthzError, Result},
    hooks::{HookChain, HookEvent},
    models::{
        Action, Record, RecordId, RelatedValue, RelationDescriptor, RelationKind, ResourceType,
        Target,
    },
    policy::{evaluate, Policy, PolicyRegistry},
    relations::RelationRegistry,
    scope::Scope,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for every authorization decision of the resource layer
pub struct Authorizer<R: Record> {
    policies: Arc<PolicyRegistry<R>>,
    relations: Arc<RelationRegistry>,
    hooks: HookChain,
}

impl<R: Record> Authorizer<R> {
    pub fn new(policies: Arc<PolicyRegistry<R>>, relations: Arc<RelationRegistry>) -> Self {
        Self {
            policies,
            relations,
            hooks: HookChain::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn policies(&self) -> &PolicyRegistry<R> {
        &self.policies
    }

    pub fn relations(&self) -> &RelationRegistry {
        &self.relations
    }

    // =============================================================================
    // Policy Resolution
    // =============================================================================

    pub fn resolve(&self, ctx: &AuthzContext, target: Target<'_, R>) -> Result<Arc<dyn Policy<R>>> {
        self.policies.resolve(ctx.subject(), target)
    }

    // =============================================================================
    // Visibility
    // =============================================================================

    /// Scope of `resource_type` for the subject of `ctx`
    pub fn scope_for(&self, ctx: &AuthzContext, resource_type: &ResourceType) -> Result<Scope<R>> {
        let policy = self.resolve(ctx, Target::Type(resource_type))?;
        ctx.mark_consulted();
        Ok(Scope::new(resource_type.clone(), policy))
    }

    /// All collection listings go through here
    pub async fn filter_collection(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        records: Vec<R>,
    ) -> Result<Vec<R>> {
        self.scope_for(ctx, resource_type)?
            .filter_collection(records)
            .await
    }

    pub async fn contains_id(
        &self,
        ctx: &AuthzContext,
        resource_type: &ResourceType,
        id: &RecordId,
    ) -> Result<bool> {
        self.scope_for(ctx, resource_type)?.contains_id(id).await
    }

    /// Scope membership is the only source of truth for visibility
    pub async fn is_visible(&self, ctx: &AuthzContext, record: &R) -> Result<bool> {
        self.scope_for(ctx, &record.resource_type())?
            .admits(record)
            .await
    }

    /// Not-found unless the record is visible
    pub async fn ensure_visible(&self, ctx: &AuthzContext, record: &R) -> Result<()> {
        if self.is_visible(ctx, record).await? {
            return Ok(());
        }
        let id = record
            .record_id()
            .unwrap_or_else(|| RecordId::from("new"));
        debug!(resource_type = %record.resource_type(), record_id = %id, "Record outside scope");
        Err(AuthzError::not_found(record.resource_type(), id))
    }

    // =============================================================================
    // Mutations
    // =============================================================================

    /// `create` for new records, `update` for persisted ones
    pub async fn authorize_write(&self, ctx: &AuthzContext, record: &R) -> Result<()> {
        self.authorize(ctx, record, Action::for_write(record)).await
    }

    pub async fn authorize_destroy(&self, ctx: &AuthzContext, record: &R) -> Result<()> {
        self.authorize(ctx, record, Action::Destroy).await
    }

    async fn authorize(&self, ctx: &AuthzContext, record: &R, action: Action) -> Result<()> {
        let policy = self.resolve(ctx, Target::Record(record))?;
        ctx.mark_consulted();

        let event = HookEvent {
            request_id: ctx.request_id(),
            subject: ctx.subject().map(|s| s.id.clone()),
            action,
            resource_type: record.resource_type(),
            record_id: record.record_id(),
            policy: policy.name(),
            at: Utc::now(),
        };

        self.hooks.run_before(&event).await?;

        debug!(
            action = %action,
            resource_type = %event.resource_type,
            record_id = ?event.record_id,
            "Evaluating policy predicate"
        );
        if !evaluate(policy.as_ref(), action).await? {
            warn!(
                request_id = %event.request_id,
                action = %action,
                resource_type = %event.resource_type,
                policy = event.policy,
                "Authorization denied"
            );
            return Err(AuthorizationFailure::new(
                action,
                event.resource_type,
                event.record_id,
                event.policy,
            )
            .into());
        }

        self.hooks.run_after(&event).await?;

        info!(
            request_id = %event.request_id,
            action = %action,
            resource_type = %event.resource_type,
            "Authorization granted"
        );
        Ok(())
    }

    // =============================================================================
    // Relations
    // =============================================================================

    /// Mask a loaded relation down to what the subject may see.
    ///
    /// An invisible to-one record comes back as absent, exactly like a
    /// missing one. An absent to-one value consults no policy at all.
    pub async fn authorize_relation_fetch(
        &self,
        ctx: &AuthzContext,
        descriptor: &RelationDescriptor,
        raw: RelatedValue<R>,
    ) -> Result<RelatedValue<R>> {
        if descriptor.kind == RelationKind::ToOne && raw.is_absent() {
            return Ok(RelatedValue::One(None));
        }
        let scope = self.scope_for(ctx, &descriptor.related_type)?;
        Self::mask_related(&scope, descriptor, raw).await
    }

    /// Apply an already obtained scope of the related type to a relation
    pub async fn mask_related(
        scope: &Scope<R>,
        descriptor: &RelationDescriptor,
        raw: RelatedValue<R>,
    ) -> Result<RelatedValue<R>> {
        match (descriptor.kind, raw) {
            (RelationKind::ToMany, RelatedValue::Many(records)) => {
                Ok(RelatedValue::Many(scope.filter_collection(records).await?))
            }
            (RelationKind::ToOne, RelatedValue::One(None)) => Ok(RelatedValue::One(None)),
            (RelationKind::ToOne, RelatedValue::One(Some(record))) => {
                let visible = scope.admits(&record).await?;
                Ok(RelatedValue::One(visible.then_some(record)))
            }
            (kind, _) => Err(AuthzError::Configuration(format!(
                "relation {} is {:?} but the store returned the other shape",
                descriptor.name, kind
            ))),
        }
    }
}
