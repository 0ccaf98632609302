use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};

/// Authorization layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzConfig {
    /// Fail successful responses of handlers that never authorized
    #[serde(default = "default_enforce_authorization")]
    pub enforce_authorization: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Include internal error causes in rendered 500 responses
    #[serde(default)]
    pub expose_error_meta: bool,
}

fn default_enforce_authorization() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            enforce_authorization: default_enforce_authorization(),
            log_level: default_log_level(),
            expose_error_meta: false,
        }
    }
}

impl AuthzConfig {
    /// Load from `AUTHZ_*` environment variables, e.g. `AUTHZ_LOG_LEVEL`
    pub fn from_env() -> Result<Self> {
        Self::from_source(::config::Environment::with_prefix("AUTHZ").try_parsing(true))
    }

    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: ::config::Source + Send + Sync + 'static,
    {
        ::config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| AuthzError::Configuration(e.to_string()))
    }
}
