//! Scoped policy enforcement for resource-oriented APIs in RustCare Engine
//!
//! This crate decides, for every request that reaches the resource layer,
//! what the caller may see and what the caller may change:
//! - Per-type policies with `create` / `update` / `destroy` predicates
//! - Visibility scopes shared by listing, single record lookup and relations
//! - Not-found for records outside the caller's scope, forbidden for records
//!   the caller can see but not change
//! - Detection of handlers that return data without authorizing anything
//! - Before/after hooks for auditing authorization decisions
//!
//! # Core Concepts
//!
//! - **Policy**: rules for one subject and one resource type
//! - **Scope**: the records of a type visible to a subject
//! - **Enforcement**: every successful response was preceded by at least one
//!   policy or scope consultation
//!
//! # Example
//!
//! ```rust,ignore
//! use auth_policy::*;
//! use std::sync::Arc;
//!
//! let policies = PolicyRegistry::new();
//! policies.register("user", |subject, target| {
//!     Arc::new(UserPolicy::new(subject, target)) as Arc<dyn Policy<Row>>
//! })?;
//!
//! let authorizer = Arc::new(Authorizer::new(Arc::new(policies), Arc::new(RelationRegistry::new())));
//! let service = ResourceService::new(authorizer, store);
//!
//! let ctx = AuthzContext::for_subject(Subject::user("alice"));
//! // 404 unless user 7 is in alice's scope, 403 if it is visible but not destroyable
//! service.destroy(&ctx, &ResourceType::new("user"), &RecordId::from(7_i64)).await?;
//! ctx.verify_authorized("DELETE /users/:id", false)?;
//! ```

pub mod models;
pub mod error;
pub mod policy;
pub mod scope;
pub mod enforcement;
pub mod hooks;
pub mod relations;
pub mod authorizer;
pub mod resource;
pub mod response;
pub mod middleware;
pub mod config;
pub mod telemetry;

pub use models::*;
pub use error::*;
pub use policy::{Policy, PolicyFactory, PolicyRegistry};
pub use scope::{Scope, ScopeFilter};
pub use enforcement::{AuthzContext, EnforcementState, EnforcementTracker};
pub use hooks::{Hook, HookChain, HookEvent, TracingHook};
pub use relations::RelationRegistry;
pub use authorizer::Authorizer;
pub use resource::{Assignable, InMemoryRecordStore, RecordStore, ResourceService};
pub use response::{reveal_cause, ErrorDocument, JsonApiError};
pub use middleware::enforce_authorization;
pub use self::config::AuthzConfig;
