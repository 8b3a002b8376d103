use thiserror::Error;

/// Error taxonomy for the Event Gateway deployment plugin.
///
/// Configuration and validation errors are raised before any remote call is
/// made. Write failures against the gateway are fatal and carry the identity
/// of the resource that failed; read failures are handled by the callers
/// (scoped list operations degrade to empty results).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Event Gateway configuration error: {0}")]
    Configuration(String),

    #[error("Invalid function declaration: {0}")]
    Validation(String),

    #[error("Couldn't register function {function_id}: {message}")]
    FunctionRegistration { function_id: String, message: String },

    #[error(
        "Could not subscribe the {function_id} function to the '{path}' endpoint. \
         A subscription for that endpoint and method already exists in another service. \
         Please remove that subscription before registering this subscription."
    )]
    SubscriptionConflict { function_id: String, path: String },

    #[error("Couldn't create subscription for {function_id} at '{path}': {message}")]
    SubscriptionFailure {
        function_id: String,
        path: String,
        message: String,
    },

    #[error("Event Gateway returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stack output '{0}' not found. Make sure the referenced resource was provisioned")]
    MissingOutput(String),
}

impl GatewayError {
    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new FunctionRegistration error
    pub fn function_registration(
        function_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::FunctionRegistration {
            function_id: function_id.into(),
            message: message.into(),
        }
    }

    /// Create a new SubscriptionFailure error
    pub fn subscription_failure(
        function_id: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SubscriptionFailure {
            function_id: function_id.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new MissingOutput error
    pub fn missing_output(output_key: impl Into<String>) -> Self {
        Self::MissingOutput(output_key.into())
    }

    /// True when the remote rejected a create because the resource already
    /// exists. Event-type creation races swallow exactly this error kind.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                *status == 409 || message.contains("already exists")
            }
            _ => false,
        }
    }

    /// True when the error was raised before any remote call.
    pub fn is_pre_flight(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Validation(_))
    }
}

/// Convenience result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let err = GatewayError::configuration("missing \"url\" property");
        assert_eq!(
            err.to_string(),
            "Event Gateway configuration error: missing \"url\" property"
        );
        assert!(err.is_pre_flight());
        assert!(!err.is_already_exists());
    }

    #[test]
    fn test_function_registration_error_names_function() {
        let err = GatewayError::function_registration("svcA-dev-hello", "HTTP 500");
        assert!(err.to_string().contains("svcA-dev-hello"));
        assert!(!err.is_pre_flight());
    }

    #[test]
    fn test_already_exists_detection() {
        let conflict = GatewayError::Api {
            status: 409,
            message: "conflict".into(),
        };
        assert!(conflict.is_already_exists());

        let textual = GatewayError::Api {
            status: 400,
            message: "event type \"user.created\" already exists".into(),
        };
        assert!(textual.is_already_exists());

        let other = GatewayError::Api {
            status: 500,
            message: "internal error".into(),
        };
        assert!(!other.is_already_exists());
    }

    #[test]
    fn test_subscription_conflict_guidance() {
        let err = GatewayError::SubscriptionConflict {
            function_id: "svcA-dev-hello".into(),
            path: "/default/hello".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/default/hello"));
        assert!(msg.contains("already exists in another service"));
    }

    #[test]
    fn test_missing_output_names_derived_key() {
        let err = GatewayError::missing_output("ProducerQueueUrl");
        assert!(err.to_string().contains("ProducerQueueUrl"));
    }
}
