use crate::{
    error::{AuthzError, Result},
    models::{Record, RecordId, ResourceType},
    policy::Policy,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Resolved visibility of one resource type for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ids", rename_all = "snake_case")]
pub enum ScopeFilter {
    /// Every record of the type
    All,
    /// Exactly the listed records
    Only(BTreeSet<RecordId>),
    /// Nothing
    None,
}

impl ScopeFilter {
    pub fn only<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordId>,
    {
        Self::Only(ids.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        match self {
            ScopeFilter::All => true,
            ScopeFilter::Only(ids) => ids.contains(id),
            ScopeFilter::None => false,
        }
    }

    /// Records without a persisted id are never part of a scope
    pub fn admits<R: Record>(&self, record: &R) -> bool {
        record.record_id().is_some_and(|id| self.contains(&id))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ScopeFilter::All => false,
            ScopeFilter::Only(ids) => ids.is_empty(),
            ScopeFilter::None => true,
        }
    }
}

/// Visibility scope of a resource type for the subject of one request.
///
/// Resolution is lazy and happens at most once per `Scope`; a new scope has
/// to be requested to observe changed data.
pub struct Scope<R: Record> {
    resource_type: ResourceType,
    policy: Arc<dyn Policy<R>>,
    resolved: OnceCell<ScopeFilter>,
}

impl<R: Record> Scope<R> {
    pub fn new(resource_type: ResourceType, policy: Arc<dyn Policy<R>>) -> Self {
        Self {
            resource_type,
            policy,
            resolved: OnceCell::new(),
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Resolve the scope through the policy.
    ///
    /// A policy that refuses to produce a scope yields an empty one. Data
    /// layer failures are passed through unchanged.
    pub async fn resolve(&self) -> Result<&ScopeFilter> {
        self.resolved
            .get_or_try_init(|| async {
                match self.policy.scope().await {
                    Ok(filter) => {
                        debug!(
                            resource_type = %self.resource_type,
                            policy = self.policy.name(),
                            empty = filter.is_empty(),
                            "Resolved scope"
                        );
                        Ok(filter)
                    }
                    Err(AuthzError::NotAuthorized(failure)) => {
                        warn!(
                            resource_type = %self.resource_type,
                            policy = failure.policy(),
                            "Scope refused, treating as empty"
                        );
                        Ok(ScopeFilter::None)
                    }
                    Err(err) => Err(err),
                }
            })
            .await
    }

    pub async fn contains_id(&self, id: &RecordId) -> Result<bool> {
        Ok(self.resolve().await?.contains(id))
    }

    /// Whether `record` is of this scope's type and inside it
    pub async fn admits(&self, record: &R) -> Result<bool> {
        if record.resource_type() != self.resource_type {
            return Ok(false);
        }
        Ok(self.resolve().await?.admits(record))
    }

    /// Keep only the records of this type inside the scope, preserving order
    pub async fn filter_collection(&self, records: Vec<R>) -> Result<Vec<R>> {
        let filter = self.resolve().await?;
        Ok(records
            .into_iter()
            .filter(|record| record.resource_type() == self.resource_type && filter.admits(record))
            .collect())
    }
}
