use crate::models::{Action, Operation, RecordId, ResourceType};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("No policy registered for resource type: {0}")]
    NoPolicyFound(ResourceType),

    #[error("Relation {relation} is not defined on {parent_type}")]
    UnknownRelation {
        parent_type: ResourceType,
        relation: String,
    },

    #[error("Relation {relation} on {parent_type} matches {matches} descriptors")]
    AmbiguousRelation {
        parent_type: ResourceType,
        relation: String,
        matches: usize,
    },

    #[error("{0}")]
    NotAuthorized(Box<AuthorizationFailure>),

    #[error("Record not found: {resource_type} {id}")]
    RecordNotFound {
        resource_type: ResourceType,
        id: RecordId,
    },

    #[error("Authorization not performed in handler {handler}")]
    AuthorizationNotPerformed { handler: String },

    #[error("Authorization hook {hook} failed: {source}")]
    Hook {
        hook: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Data layer error: {0}")]
    DataLayer(#[source] anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthzError {
    pub fn not_found(resource_type: ResourceType, id: RecordId) -> Self {
        Self::RecordNotFound { resource_type, id }
    }

    /// Errors caused by how policies and relations were registered
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::NoPolicyFound(_)
                | Self::UnknownRelation { .. }
                | Self::AmbiguousRelation { .. }
                | Self::Configuration(_)
        )
    }

    /// Errors that indicate a handler reachable without any authorization
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Self::AuthorizationNotPerformed { .. })
    }

    pub fn failure(&self) -> Option<&AuthorizationFailure> {
        match self {
            Self::NotAuthorized(failure) => Some(&**failure),
            _ => None,
        }
    }

    /// Attach the operation in progress to an authorization failure
    pub fn during(self, operation: Operation) -> Self {
        match self {
            Self::NotAuthorized(failure) => {
                Self::NotAuthorized(Box::new((*failure).with_operation(operation)))
            }
            other => other,
        }
    }
}

impl From<AuthorizationFailure> for AuthzError {
    fn from(failure: AuthorizationFailure) -> Self {
        Self::NotAuthorized(Box::new(failure))
    }
}

/// A policy predicate answered no
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationFailure {
    action: Action,
    operation: Option<Operation>,
    resource_type: ResourceType,
    record_id: Option<RecordId>,
    policy: &'static str,
}

impl AuthorizationFailure {
    pub fn new(
        action: Action,
        resource_type: ResourceType,
        record_id: Option<RecordId>,
        policy: &'static str,
    ) -> Self {
        Self {
            action,
            operation: None,
            resource_type,
            record_id,
            policy,
        }
    }

    fn with_operation(self, operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            ..self
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// The inbound operation, falling back to the predicate that failed
    pub fn operation(&self) -> Operation {
        self.operation.unwrap_or_else(|| Operation::from(self.action))
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.record_id.as_ref()
    }

    pub fn policy(&self) -> &'static str {
        self.policy
    }
}

impl fmt::Display for AuthorizationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Not allowed to {} this {} ({} denied {})",
            self.operation().verb(),
            self.resource_type.humanize(),
            self.policy,
            self.action
        )
    }
}

impl std::error::Error for AuthorizationFailure {}

pub type Result<T> = std::result::Result<T, AuthzError>;
