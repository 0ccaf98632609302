use crate::error::AuthzError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// A single JSON:API error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonApiError {
    pub code: String,
    pub status: String,
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Top level `{"errors": [...]}` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub errors: Vec<JsonApiError>,
}

impl AuthzError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthzError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AuthzError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
            AuthzError::NoPolicyFound(_)
            | AuthzError::UnknownRelation { .. }
            | AuthzError::AmbiguousRelation { .. }
            | AuthzError::AuthorizationNotPerformed { .. }
            | AuthzError::Hook { .. }
            | AuthzError::DataLayer(_)
            | AuthzError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a JSON:API error document.
    ///
    /// Internal errors only carry their cause in `meta` when `expose_meta`
    /// is set.
    pub fn to_document(&self, expose_meta: bool) -> ErrorDocument {
        let status = self.status_code();
        let (title, detail) = match self {
            AuthzError::NotAuthorized(failure) => {
                let operation = failure.operation();
                (
                    format!("{} Forbidden", operation.label()),
                    format!(
                        "You don't have permission to {} this {}.",
                        operation.verb(),
                        failure.resource_type().humanize()
                    ),
                )
            }
            AuthzError::RecordNotFound { id, .. } => (
                "Record not found".to_string(),
                format!("The record identified by {} could not be found.", id),
            ),
            _ => (
                "Internal Server Error".to_string(),
                "Internal Server Error".to_string(),
            ),
        };

        let meta = (expose_meta && status.is_server_error())
            .then(|| serde_json::json!({ "exception": self.to_string() }));

        ErrorDocument {
            errors: vec![JsonApiError {
                code: status.as_u16().to_string(),
                status: status.as_u16().to_string(),
                title,
                detail,
                meta,
            }],
        }
    }

    /// Build the HTTP response, logging anything that is not the caller's fault
    pub fn render(&self, expose_meta: bool) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(
                error = %self,
                configuration = self.is_configuration_error(),
                programming = self.is_programming_error(),
                "Authorization layer error"
            );
        }
        (status, Json(self.to_document(expose_meta))).into_response()
    }
}

impl IntoResponse for AuthzError {
    /// Renders without `meta`; the error rides along in the response
    /// extensions so [`reveal_cause`] can render it again later.
    fn into_response(self) -> Response {
        let mut response = self.render(false);
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

/// Re-render a 5xx [`AuthzError`] response with its cause in `meta`.
///
/// Responses that did not come from an `AuthzError` are returned untouched.
pub fn reveal_cause(response: Response) -> Response {
    match response.extensions().get::<Arc<AuthzError>>().cloned() {
        Some(err) if err.status_code().is_server_error() => {
            let mut revealed = (err.status_code(), Json(err.to_document(true))).into_response();
            revealed.extensions_mut().insert(err);
            revealed
        }
        _ => response,
    }
}
