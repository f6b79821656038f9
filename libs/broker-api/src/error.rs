/// Category of a gateway error. Lets the HTTP layer and page diagnostics
/// react to a class of failure without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity or timeout talking to the cluster. Caller may retry.
    Transport,
    /// Credential lacks the rights for the request.
    Authorization,
    /// Topic exists / does not exist. User-actionable.
    Conflict,
    /// Cluster cannot satisfy the request as configured (e.g. too few brokers).
    Configuration,
    /// Broker accepted the request but never confirmed the outcome.
    Unconfirmed,
    /// Malformed request rejected before reaching the cluster.
    Request,
    /// Anything else reported by the broker or the backend.
    Broker,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transport => f.write_str("transport"),
            ErrorKind::Authorization => f.write_str("authorization"),
            ErrorKind::Conflict => f.write_str("conflict"),
            ErrorKind::Configuration => f.write_str("configuration"),
            ErrorKind::Unconfirmed => f.write_str("unconfirmed"),
            ErrorKind::Request => f.write_str("request"),
            ErrorKind::Broker => f.write_str("broker"),
        }
    }
}

/// Unified error type for every broker-facing operation.
///
/// Backends translate their native failures into these variants; the
/// engine surfaces them unchanged except for per-partition read failures,
/// which the page fetcher turns into diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("topic '{0}' already exists")]
    TopicAlreadyExists(String),

    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    #[error("replication factor {requested} exceeds {available} live broker(s)")]
    InsufficientBrokers { requested: i16, available: usize },

    #[error("topic [{0}] not created")]
    CreationNotConfirmed(String),

    #[error("topic [{0}] not deleted")]
    DeletionNotConfirmed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} is not supported by this cluster backend")]
    Unsupported(&'static str),

    #[error("broker error: {0}")]
    Broker(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::BrokerUnavailable(_) => ErrorKind::Transport,
            GatewayError::AuthorizationDenied(_) => ErrorKind::Authorization,
            GatewayError::TopicAlreadyExists(_) | GatewayError::TopicNotFound(_) => {
                ErrorKind::Conflict
            }
            GatewayError::InsufficientBrokers { .. } | GatewayError::Unsupported(_) => {
                ErrorKind::Configuration
            }
            GatewayError::CreationNotConfirmed(_) | GatewayError::DeletionNotConfirmed(_) => {
                ErrorKind::Unconfirmed
            }
            GatewayError::InvalidRequest(_) => ErrorKind::Request,
            GatewayError::Broker(_) => ErrorKind::Broker,
        }
    }

    /// Transport failures are the only ones worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Timeout of a single broker call.
    pub fn timed_out(what: impl std::fmt::Display, after: std::time::Duration) -> Self {
        GatewayError::BrokerUnavailable(format!("{what} timed out after {} ms", after.as_millis()))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InvalidRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(GatewayError::TopicNotFound("a".into()).kind(), ErrorKind::Conflict);
        assert_eq!(GatewayError::TopicAlreadyExists("a".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            GatewayError::InsufficientBrokers { requested: 3, available: 1 }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(GatewayError::CreationNotConfirmed("a".into()).kind(), ErrorKind::Unconfirmed);
        assert_eq!(GatewayError::DeletionNotConfirmed("a".into()).kind(), ErrorKind::Unconfirmed);
        assert_eq!(GatewayError::AuthorizationDenied("x".into()).kind(), ErrorKind::Authorization);
    }

    #[test]
    fn only_transport_is_transient() {
        assert!(GatewayError::timed_out("fetch", Duration::from_millis(5)).is_transient());
        assert!(!GatewayError::TopicNotFound("a".into()).is_transient());
        assert!(!GatewayError::Broker("boom".into()).is_transient());
    }

    #[test]
    fn messages_name_the_topic() {
        assert_eq!(GatewayError::CreationNotConfirmed("x".into()).to_string(), "topic [x] not created");
        assert_eq!(
            GatewayError::timed_out("list topics", Duration::from_millis(250)).to_string(),
            "broker unavailable: list topics timed out after 250 ms"
        );
    }
}
