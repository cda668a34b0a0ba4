//! Error types for the delivery engine
//!
//! Only configuration validation surfaces errors to callers; every
//! other failure class degrades to a structured warning delivered
//! through the engine itself.

pub type Result<T> = std::result::Result<T, DeliveryError>;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Invalid configuration supplied by the external loader
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// No broker endpoint was reachable at configure time
    #[error("Broker unreachable at {endpoints:?}: {message}")]
    BrokerUnreachable {
        endpoints: Vec<String>,
        message: String,
    },

    /// A designated partition-key field was absent or not a string
    #[error("Partition key field '{field}' {problem}")]
    PartitionKey { field: String, problem: String },

    /// The broker transport rejected or failed a send
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        DeliveryError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a missing partition key error
    pub fn partition_key_missing(field: impl Into<String>) -> Self {
        DeliveryError::PartitionKey {
            field: field.into(),
            problem: "absent".into(),
        }
    }

    /// Create a mistyped partition key error
    pub fn partition_key_not_string(field: impl Into<String>) -> Self {
        DeliveryError::PartitionKey {
            field: field.into(),
            problem: "was not a string".into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        DeliveryError::Transport(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeliveryError::config("broker", "topic must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for broker: topic must not be empty"
        );

        let err = DeliveryError::partition_key_missing("@uuid");
        assert_eq!(err.to_string(), "Partition key field '@uuid' absent");

        let err = DeliveryError::partition_key_not_string("@uuid");
        assert_eq!(
            err.to_string(),
            "Partition key field '@uuid' was not a string"
        );
    }

    #[test]
    fn test_error_matching() {
        let err = DeliveryError::config("broker", "x");
        assert!(matches!(err, DeliveryError::InvalidConfiguration { .. }));

        let err = DeliveryError::transport("connection reset");
        assert!(matches!(err, DeliveryError::Transport(_)));
    }
}
