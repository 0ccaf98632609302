//! Per-request record of whether authorization actually happened.
//!
//! Every request gets one [`AuthzContext`]. Consulting a policy predicate or
//! a scope marks its tracker; when the request is about to produce a
//! successful response the tracker is verified, so a handler that forgot to
//! authorize fails loudly instead of silently serving data.

use crate::{
    error::{AuthzError, Result},
    models::Subject,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementState {
    Unconsulted,
    Consulted,
}

#[derive(Debug, Default)]
pub struct EnforcementTracker {
    consulted: AtomicBool,
}

impl EnforcementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-way transition to `Consulted`
    pub fn mark_consulted(&self) {
        self.consulted.store(true, Ordering::Release);
    }

    pub fn state(&self) -> EnforcementState {
        if self.consulted.load(Ordering::Acquire) {
            EnforcementState::Consulted
        } else {
            EnforcementState::Unconsulted
        }
    }

    /// Responses that already carry an error status are exempt
    pub fn verify(&self, handler: &str, is_error_response: bool) -> Result<()> {
        if is_error_response || self.state() == EnforcementState::Consulted {
            return Ok(());
        }
        error!(handler, "Successful response produced without authorization");
        Err(AuthzError::AuthorizationNotPerformed {
            handler: handler.to_string(),
        })
    }
}

/// Request-scoped authorization context.
///
/// Constructed once per request by the surrounding request handling layer
/// and passed unchanged to every authorization call.
#[derive(Debug)]
pub struct AuthzContext {
    subject: Option<Subject>,
    request_id: Uuid,
    tracker: EnforcementTracker,
}

impl AuthzContext {
    pub fn new(subject: Option<Subject>) -> Self {
        Self {
            subject,
            request_id: Uuid::new_v4(),
            tracker: EnforcementTracker::new(),
        }
    }

    pub fn for_subject(subject: Subject) -> Self {
        Self::new(Some(subject))
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn enforcement(&self) -> &EnforcementTracker {
        &self.tracker
    }

    pub(crate) fn mark_consulted(&self) {
        self.tracker.mark_consulted();
    }

    /// Declare the current handler intentionally public
    pub fn skip_authorization(&self) {
        debug!(request_id = %self.request_id, "Authorization explicitly skipped");
        self.tracker.mark_consulted();
    }

    pub fn verify_authorized(&self, handler: &str, is_error_response: bool) -> Result<()> {
        self.tracker.verify(handler, is_error_response)
    }
}
