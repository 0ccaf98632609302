use crate::{
    error::{AuthzError, Result},
    models::{Action, Record, ResourceType, Subject, Target},
    scope::ScopeFilter,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tracing::debug;

/// Authorization rules for one subject and one target type.
///
/// Predicates default to denying. A policy must not carry state from one
/// request into another; the registry builds a fresh instance per use.
#[async_trait]
pub trait Policy<R: Record>: Send + Sync {
    async fn create(&self) -> Result<bool> {
        Ok(false)
    }

    async fn update(&self) -> Result<bool> {
        Ok(false)
    }

    async fn destroy(&self) -> Result<bool> {
        Ok(false)
    }

    /// Records of the target type the subject may see
    async fn scope(&self) -> Result<ScopeFilter>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Evaluate the predicate an action maps to
pub async fn evaluate<R: Record>(policy: &dyn Policy<R>, action: Action) -> Result<bool> {
    match action {
        Action::Create => policy.create().await,
        Action::Update => policy.update().await,
        Action::Destroy => policy.destroy().await,
    }
}

/// Builds the policy for a (subject, target) pair
pub trait PolicyFactory<R: Record>: Send + Sync {
    fn build(&self, subject: Option<&Subject>, target: Target<'_, R>) -> Arc<dyn Policy<R>>;
}

impl<R, F> PolicyFactory<R> for F
where
    R: Record,
    F: Fn(Option<&Subject>, Target<'_, R>) -> Arc<dyn Policy<R>> + Send + Sync,
{
    fn build(&self, subject: Option<&Subject>, target: Target<'_, R>) -> Arc<dyn Policy<R>> {
        self(subject, target)
    }
}

/// Registration table of policy factories keyed by resource type.
///
/// Filled at startup and only read afterwards; entries are never replaced.
pub struct PolicyRegistry<R: Record> {
    factories: DashMap<ResourceType, Arc<dyn PolicyFactory<R>>>,
}

impl<R: Record> PolicyRegistry<R> {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    pub fn register<F>(&self, resource_type: &str, factory: F) -> Result<()>
    where
        F: Fn(Option<&Subject>, Target<'_, R>) -> Arc<dyn Policy<R>> + Send + Sync + 'static,
    {
        match self.factories.entry(ResourceType::new(resource_type)) {
            Entry::Occupied(entry) => Err(AuthzError::Configuration(format!(
                "policy for {} registered twice",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                debug!(resource_type = %entry.key(), "Registering policy");
                entry.insert(Arc::new(factory));
                Ok(())
            }
        }
    }

    pub fn is_registered(&self, resource_type: &ResourceType) -> bool {
        self.factories.contains_key(resource_type)
    }

    /// Build the policy for a subject and target
    pub fn resolve(
        &self,
        subject: Option<&Subject>,
        target: Target<'_, R>,
    ) -> Result<Arc<dyn Policy<R>>> {
        let resource_type = target.resource_type();
        let factory = self
            .factories
            .get(&resource_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AuthzError::NoPolicyFound(resource_type.clone()))?;

        let policy = factory.build(subject, target);
        debug!(
            resource_type = %resource_type,
            policy = policy.name(),
            "Resolved policy"
        );
        Ok(policy)
    }
}

impl<R: Record> Default for PolicyRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}
