//! Error types for the simulator client and normalizer

use thiserror::Error;

/// Result type for sim-rl operations
pub type Result<T> = std::result::Result<T, SimError>;

/// sim-rl error types
#[derive(Debug, Error)]
pub enum SimError {
    /// Transport could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation needs a live connection but the session is disconnected
    #[error("Not connected to simulator")]
    NotConnected,

    /// Connected, but no simulation session has been started
    #[error("No active simulation session, call reset")]
    NoSession,

    /// Connect, read or write exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Stream ended mid-frame or declared an implausible length
    #[error("Framing error: {0}")]
    Framing(String),

    /// Simulator answered with `Success: false`
    #[error("Simulator rejected {command}: {body}")]
    Application {
        command: String,
        body: serde_json::Value,
    },

    /// Unrecognized option value such as a reward, scaling kind or address
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Normalization config missing, unreadable or malformed
    #[error("Failed to load normalization config: {0}")]
    ConfigLoad(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response did not match the expected schema
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Feature value does not match its recorded or configured shape
    #[error("Feature shape mismatch: {0}")]
    FeatureShape(String),

    /// Normalizer used in the wrong mode
    #[error("Normalization error: {0}")]
    Normalization(String),
}

impl SimError {
    /// Errors raised by the transport layer rather than the simulator
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SimError::Connection(_)
                | SimError::NotConnected
                | SimError::Timeout(_)
                | SimError::Framing(_)
        )
    }

    /// Whether the connection this error came from must be thrown away
    pub fn invalidates_session(&self) -> bool {
        self.is_transport()
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_error_keeps_session() {
        let err = SimError::Application {
            command: "CAST".into(),
            body: serde_json::json!("spell on cooldown"),
        };
        assert!(!err.is_transport());
        assert!(!err.invalidates_session());
        assert!(err.to_string().contains("CAST"));
    }

    #[test]
    fn test_config_error_is_not_transport() {
        let err = SimError::Config("max_dps is not a valid reward type".into());
        assert!(!err.is_transport());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: max_dps is not a valid reward type"
        );
    }

    #[test]
    fn test_transport_errors_invalidate_session() {
        for err in [
            SimError::Timeout("read".into()),
            SimError::Framing("eof".into()),
            SimError::Connection("refused".into()),
            SimError::NotConnected,
        ] {
            assert!(err.is_transport(), "{err}");
            assert!(err.invalidates_session(), "{err}");
        }
    }
}
