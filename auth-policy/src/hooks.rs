use crate::{
    error::{AuthzError, Result},
    models::{Action, RecordId, ResourceType},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What an authorization hook gets to observe
#[derive(Debug, Clone, Serialize)]
pub struct HookEvent {
    pub request_id: Uuid,
    pub subject: Option<String>,
    pub action: Action,
    pub resource_type: ResourceType,
    pub record_id: Option<RecordId>,
    pub policy: &'static str,
    pub at: DateTime<Utc>,
}

/// Observer of policy predicate evaluation.
///
/// Hooks see the decision but can never change it; an error returned from a
/// hook aborts the request.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, event: &HookEvent) -> anyhow::Result<()>;
}

#[derive(Clone)]
struct NamedHook {
    name: String,
    hook: Arc<dyn Hook>,
}

/// Ordered before/after hooks around predicate evaluation
#[derive(Clone, Default)]
pub struct HookChain {
    before: Vec<NamedHook>,
    after: Vec<NamedHook>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before(mut self, name: &str, hook: impl Hook + 'static) -> Self {
        self.before.push(NamedHook {
            name: name.to_string(),
            hook: Arc::new(hook),
        });
        self
    }

    pub fn after(mut self, name: &str, hook: impl Hook + 'static) -> Self {
        self.after.push(NamedHook {
            name: name.to_string(),
            hook: Arc::new(hook),
        });
        self
    }

    pub fn before_names(&self) -> Vec<&str> {
        self.before.iter().map(|h| h.name.as_str()).collect()
    }

    pub fn after_names(&self) -> Vec<&str> {
        self.after.iter().map(|h| h.name.as_str()).collect()
    }

    /// Runs unconditionally before the predicate
    pub async fn run_before(&self, event: &HookEvent) -> Result<()> {
        Self::run(&self.before, event).await
    }

    /// Runs only after a predicate that returned true
    pub async fn run_after(&self, event: &HookEvent) -> Result<()> {
        Self::run(&self.after, event).await
    }

    async fn run(hooks: &[NamedHook], event: &HookEvent) -> Result<()> {
        for named in hooks {
            debug!(hook = %named.name, action = %event.action, "Running authorization hook");
            named
                .hook
                .call(event)
                .await
                .map_err(|source| AuthzError::Hook {
                    hook: named.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Logs every authorization decision it observes
pub struct TracingHook;

#[async_trait]
impl Hook for TracingHook {
    async fn call(&self, event: &HookEvent) -> anyhow::Result<()> {
        info!(
            request_id = %event.request_id,
            subject = event.subject.as_deref().unwrap_or("anonymous"),
            action = %event.action,
            resource_type = %event.resource_type,
            record_id = event.record_id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
            policy = event.policy,
            "Authorization decision"
        );
        Ok(())
    }
}
