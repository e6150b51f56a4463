//! Error types for the alert-model crate.

use thiserror::Error;

/// Errors raised while validating or decoding resources.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A resource failed validation.
    #[error("invalid {kind} '{name}': {reason}")]
    Invalid {
        /// The resource kind.
        kind: &'static str,
        /// The resource name.
        name: String,
        /// Why validation failed.
        reason: String,
    },

    /// An identity string could not be parsed.
    #[error("invalid resource identity '{0}': expected <namespace>/<name>")]
    InvalidIdentity(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid() {
        let err = ModelError::Invalid {
            kind: "AlertPolicy",
            name: "cpu".to_string(),
            reason: "no conditions".to_string(),
        };
        assert_eq!(err.to_string(), "invalid AlertPolicy 'cpu': no conditions");
    }

    #[test]
    fn error_display_identity() {
        let err = ModelError::InvalidIdentity("nope".to_string());
        assert_eq!(
            err.to_string(),
            "invalid resource identity 'nope': expected <namespace>/<name>"
        );
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());
        let err: ModelError = json_err.unwrap_err().into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
